//! Buffer layout compiler
//!
//! When only some columns of a row are needed, the row can be described as
//! an alternating sequence of spans to copy and spans to skip. Adjacent spans
//! of the same kind are merged, so replaying the instructions over a row
//! copies the selected columns into a packed buffer with as few copy and
//! skip operations as possible.
//!
//! The instructions cover the whole row, deletion flag included, in
//! ascending source order with no gaps and no overlaps.

use encoding_rs::Encoding;

use super::column::Column;
use super::header::{ColumnRef, Header};
use super::source::{self, Source};
use super::value::Value;
use crate::error::{DbfError, DbfResult};

/// One step of filling a packed buffer from a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillInstruction {
    /// Copy `count` source bytes to `destination` in the packed buffer
    Read { count: usize, destination: usize },
    /// Advance past `count` source bytes
    Skip { count: usize },
}

impl FillInstruction {
    /// Number of source bytes this instruction consumes
    pub fn count(&self) -> usize {
        match self {
            FillInstruction::Read { count, .. } | FillInstruction::Skip { count } => *count,
        }
    }
}

/// Accumulates spans, merging same-kind neighbours
struct LayoutBuilder {
    instructions: Vec<FillInstruction>,
    pending: Option<FillInstruction>,
    packed_size: usize,
}

impl LayoutBuilder {
    fn new() -> Self {
        LayoutBuilder {
            instructions: Vec::new(),
            pending: None,
            packed_size: 0,
        }
    }

    fn read(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        match &mut self.pending {
            Some(FillInstruction::Read { count: pending, .. }) => *pending += count,
            _ => {
                self.commit();
                self.pending = Some(FillInstruction::Read {
                    count,
                    destination: self.packed_size,
                });
            }
        }
        self.packed_size += count;
    }

    fn skip(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        match &mut self.pending {
            Some(FillInstruction::Skip { count: pending }) => *pending += count,
            _ => {
                self.commit();
                self.pending = Some(FillInstruction::Skip { count });
            }
        }
    }

    fn commit(&mut self) {
        if let Some(instruction) = self.pending.take() {
            self.instructions.push(instruction);
        }
    }
}

/// Compiled copy/skip plan for a subset of a table's columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferLayout {
    instructions: Vec<FillInstruction>,
    /// (column index, destination offset) for every selected column
    destinations: Vec<(usize, usize)>,
    packed_size: usize,
    row_width: usize,
}

impl BufferLayout {
    /// Compile a layout that extracts `selected` columns from rows of `header`
    pub fn compile<C: ColumnRef>(header: &Header, selected: &[C]) -> DbfResult<Self> {
        let mut wanted = vec![false; header.columns().len()];
        for column in selected {
            wanted[column.resolve(header)?] = true;
        }

        let mut order: Vec<(usize, &Column)> = header.columns().iter().enumerate().collect();
        order.sort_by_key(|(_, c)| c.offset());

        let mut builder = LayoutBuilder::new();
        let mut destinations = Vec::new();
        // Deletion flag
        builder.skip(1);
        let mut position = 1;

        for (index, column) in order {
            let start = 1 + column.offset();
            if start < position && column.size() > 0 {
                return Err(DbfError::Format(format!(
                    "column '{}' overlaps the previous column",
                    column.name()
                )));
            }
            builder.skip(start.saturating_sub(position));
            position = position.max(start);

            if wanted[index] {
                destinations.push((index, builder.packed_size));
                builder.read(column.size());
            } else {
                builder.skip(column.size());
            }
            position += column.size();
        }

        if position > header.row_width() {
            return Err(DbfError::Format(format!(
                "columns span {} bytes but rows are {} bytes wide",
                position,
                header.row_width()
            )));
        }
        builder.skip(header.row_width() - position);
        builder.commit();

        Ok(BufferLayout {
            instructions: builder.instructions,
            destinations,
            packed_size: builder.packed_size,
            row_width: header.row_width(),
        })
    }

    pub fn instructions(&self) -> &[FillInstruction] {
        &self.instructions
    }

    /// Size of the packed buffer holding all selected columns
    pub fn packed_size(&self) -> usize {
        self.packed_size
    }

    /// Offset of a selected column inside the packed buffer
    pub fn destination(&self, column_index: usize) -> Option<usize> {
        self.destinations
            .iter()
            .find(|(index, _)| *index == column_index)
            .map(|(_, destination)| *destination)
    }

    /// Replay over an in-memory row that starts with its deletion flag
    pub fn apply(&self, row: &[u8], packed: &mut [u8]) -> DbfResult<()> {
        self.check_packed(packed)?;
        if row.len() < self.row_width {
            return Err(DbfError::OutOfRange(format!(
                "row buffer holds {} bytes, layout needs {}",
                row.len(),
                self.row_width
            )));
        }

        let mut position = 0;
        for instruction in &self.instructions {
            if let FillInstruction::Read { count, destination } = *instruction {
                packed[destination..destination + count]
                    .copy_from_slice(&row[position..position + count]);
            }
            position += instruction.count();
        }
        Ok(())
    }

    /// Replay directly over a stream positioned at the start of a row.
    /// Returns the number of source bytes consumed, short only if the stream
    /// ended early.
    pub fn fill_from<S: Source + ?Sized>(&self, source: &mut S, packed: &mut [u8]) -> DbfResult<usize> {
        self.check_packed(packed)?;

        let mut consumed = 0;
        for instruction in &self.instructions {
            let n = match *instruction {
                FillInstruction::Read { count, destination } => {
                    source::fill(source, &mut packed[destination..destination + count])?
                }
                FillInstruction::Skip { count } => source::skip(source, count as u64)? as usize,
            };
            consumed += n;
            if n < instruction.count() {
                break;
            }
        }
        Ok(consumed)
    }

    /// Decode a selected column from a packed buffer
    pub fn value<C: ColumnRef + ?Sized>(
        &self,
        header: &Header,
        packed: &[u8],
        column: &C,
        encoding: &'static Encoding,
    ) -> DbfResult<Option<Value>> {
        let index = column.resolve(header)?;
        let destination = self.destination(index).ok_or_else(|| {
            DbfError::OutOfRange(format!(
                "column '{}' is not part of this layout",
                header.columns()[index].name()
            ))
        })?;
        header.columns()[index].decode(packed, destination, encoding)
    }

    fn check_packed(&self, packed: &[u8]) -> DbfResult<()> {
        if packed.len() < self.packed_size {
            return Err(DbfError::OutOfRange(format!(
                "packed buffer holds {} bytes, layout needs {}",
                packed.len(),
                self.packed_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::column::ColumnKind;
    use crate::storage::source::Forward;
    use crate::testing::{basic_table, Fragmented, TableImage};
    use encoding_rs::UTF_8;
    use std::io::Cursor;

    fn header_of(image: &[u8]) -> Header {
        Header::load(&mut Cursor::new(image)).unwrap()
    }

    fn wide_header() -> Header {
        header_of(
            &TableImage::new()
                .column("A", b'C', 3, 0)
                .column("B", b'C', 2, 0)
                .column("C", b'C', 4, 0)
                .column("D", b'C', 1, 0)
                .column("E", b'C', 5, 0)
                .build(),
        )
    }

    #[test]
    fn test_all_selected_is_two_instructions() {
        let header = wide_header();
        let layout = BufferLayout::compile(&header, &["A", "B", "C", "D", "E"]).unwrap();
        assert_eq!(
            layout.instructions(),
            &[
                FillInstruction::Skip { count: 1 },
                FillInstruction::Read { count: 15, destination: 0 },
            ]
        );
        assert_eq!(layout.packed_size(), 15);
    }

    #[test]
    fn test_merges_adjacent_spans() {
        let header = wide_header();
        let layout = BufferLayout::compile(&header, &["B", "C", "E"]).unwrap();
        assert_eq!(
            layout.instructions(),
            &[
                FillInstruction::Skip { count: 4 },
                FillInstruction::Read { count: 6, destination: 0 },
                FillInstruction::Skip { count: 1 },
                FillInstruction::Read { count: 5, destination: 6 },
            ]
        );
        assert_eq!(layout.destination(1), Some(0));
        assert_eq!(layout.destination(2), Some(2));
        assert_eq!(layout.destination(4), Some(6));
        assert_eq!(layout.destination(0), None);
    }

    #[test]
    fn test_nothing_selected_is_one_skip() {
        let header = wide_header();
        let layout = BufferLayout::compile::<&str>(&header, &[]).unwrap();
        assert_eq!(layout.instructions(), &[FillInstruction::Skip { count: 16 }]);
        assert_eq!(layout.packed_size(), 0);
    }

    #[test]
    fn test_instructions_cover_row_exactly() {
        let header = wide_header();
        for selection in [&["A"][..], &["A", "C", "E"], &["B", "D"], &["E"]] {
            let layout = BufferLayout::compile(&header, selection).unwrap();
            let total: usize = layout.instructions().iter().map(|i| i.count()).sum();
            assert_eq!(total, header.row_width());
            for pair in layout.instructions().windows(2) {
                assert_ne!(
                    std::mem::discriminant(&pair[0]),
                    std::mem::discriminant(&pair[1])
                );
            }
        }
    }

    #[test]
    fn test_trailing_hole_is_skipped() {
        let mut image = TableImage::new().column("A", b'C', 2, 0).build();
        // Declare a row width with 3 unused bytes after the columns
        image[10] = 6;
        let header = header_of(&image);
        let layout = BufferLayout::compile(&header, &["A"]).unwrap();
        assert_eq!(
            layout.instructions(),
            &[
                FillInstruction::Skip { count: 1 },
                FillInstruction::Read { count: 2, destination: 0 },
                FillInstruction::Skip { count: 3 },
            ]
        );
    }

    #[test]
    fn test_apply_and_decode() {
        let header = header_of(&basic_table());
        let layout = BufferLayout::compile(&header, &["LONG", "TEXT"]).unwrap();

        let image = basic_table();
        let first_row = &image[header.header_size() as usize..][..header.row_width()];
        let mut packed = vec![0u8; layout.packed_size()];
        layout.apply(first_row, &mut packed).unwrap();

        assert_eq!(
            layout.value(&header, &packed, "TEXT", UTF_8).unwrap(),
            Some(Value::String("text 1 text".into()))
        );
        assert_eq!(
            layout.value(&header, &packed, "LONG", UTF_8).unwrap(),
            Some(Value::Integer(123456))
        );
        let err = layout.value(&header, &packed, "DATE", UTF_8).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::OutOfRange);
    }

    #[test]
    fn test_fill_from_forward_stream_matches_apply() {
        let image = basic_table();
        let header = header_of(&image);
        let layout = BufferLayout::compile(&header, &["DATE", "LOGICAL"]).unwrap();
        let body = &image[header.header_size() as usize..];

        let mut expected = vec![0u8; layout.packed_size()];
        layout.apply(&body[header.row_width()..], &mut expected).unwrap();

        let mut source = Forward(Fragmented::new(Cursor::new(body.to_vec()), 5));
        let mut packed = vec![0u8; layout.packed_size()];
        assert_eq!(layout.fill_from(&mut source, &mut packed).unwrap(), header.row_width());
        assert_eq!(layout.fill_from(&mut source, &mut packed).unwrap(), header.row_width());
        assert_eq!(packed, expected);
    }

    #[test]
    fn test_rejects_small_buffers() {
        let header = wide_header();
        let layout = BufferLayout::compile(&header, &["A"]).unwrap();
        assert!(layout.apply(&[0u8; 4], &mut [0u8; 3]).is_err());
        assert!(layout.apply(&[0u8; 16], &mut [0u8; 2]).is_err());
    }

    #[test]
    fn test_zero_size_column_selected() {
        let header = Header::new(
            vec![
                Column::new("A", ColumnKind::String, b'C', 0, 2, 0),
                Column::new("Z", ColumnKind::String, b'C', 2, 0, 0),
            ],
            3,
            1,
            None,
        );
        let layout = BufferLayout::compile(&header, &["Z"]).unwrap();
        assert_eq!(layout.instructions(), &[FillInstruction::Skip { count: 3 }]);
        assert_eq!(layout.value(&header, &[], "Z", UTF_8).unwrap(), None);
    }
}
