//! Row cursor - the forward-only buffering state machine behind a reader
//!
//! The cursor owns a buffer of up to N whole rows. It never performs I/O
//! itself: [`RowCursor::step`] reports when the buffer must be refilled, the
//! caller fills [`RowCursor::refill_target`] in whatever way suits it
//! (blocking or awaiting), then reports the byte count via
//! [`RowCursor::refilled`]. Both read forms therefore share one control flow.

use crate::config::ReaderOptions;
use crate::error::{DbfError, DbfResult};
use crate::storage::header::Header;

/// Deletion flag value of a soft-deleted row
pub const DELETED_FLAG: u8 = b'*';

/// Cursor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No row is loaded: before the first read, or between rows
    Unpositioned,
    /// A live row is loaded and its columns can be read
    Positioned,
    /// Every row has been consumed
    AtEnd,
}

/// Outcome of one cursor step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// The buffer is used up; refill it and step again
    Refill,
    /// Moved onto a soft-deleted row; step again
    Deleted,
    /// Moved onto a live row
    Loaded,
    /// All rows consumed
    Exhausted,
}

#[derive(Debug)]
pub(crate) struct RowCursor {
    buffer: Vec<u8>,
    row_width: usize,
    /// Bytes a row occupies in the buffer for column slicing
    row_span: usize,
    rows_per_buffer: usize,
    row_count: u64,
    /// Rows stepped over so far, deleted ones included
    consumed: u64,
    rows_in_buffer: usize,
    pending_rows: usize,
    next_slot: usize,
    current: usize,
    state: CursorState,
}

impl RowCursor {
    pub(crate) fn new(header: &Header, options: &ReaderOptions) -> Self {
        let row_width = header.row_width();
        let row_span = header.row_span();
        let rows_per_buffer = options.rows_per_buffer(row_width);

        RowCursor {
            buffer: vec![0u8; (rows_per_buffer - 1) * row_width + row_span],
            row_width,
            row_span,
            rows_per_buffer,
            row_count: header.row_count() as u64,
            consumed: 0,
            rows_in_buffer: 0,
            pending_rows: 0,
            next_slot: 0,
            current: 0,
            state: CursorState::Unpositioned,
        }
    }

    pub(crate) fn state(&self) -> CursorState {
        self.state
    }

    pub(crate) fn rows_per_buffer(&self) -> usize {
        self.rows_per_buffer
    }

    /// Rows stepped over so far, soft-deleted ones included
    pub(crate) fn consumed(&self) -> u64 {
        self.consumed
    }

    pub(crate) fn step(&mut self) -> Step {
        if self.consumed >= self.row_count {
            self.state = CursorState::AtEnd;
            return Step::Exhausted;
        }
        self.state = CursorState::Unpositioned;
        if self.next_slot >= self.rows_in_buffer {
            return Step::Refill;
        }

        self.current = self.next_slot * self.row_width;
        self.next_slot += 1;
        self.consumed += 1;

        if self.buffer[self.current] == DELETED_FLAG {
            Step::Deleted
        } else {
            self.state = CursorState::Positioned;
            Step::Loaded
        }
    }

    /// Region to fill: as many whole rows as fit, never past the last row
    pub(crate) fn refill_target(&mut self) -> &mut [u8] {
        let remaining = self.row_count - self.consumed;
        self.pending_rows = (self.rows_per_buffer as u64).min(remaining) as usize;
        let len = self.pending_rows * self.row_width;
        &mut self.buffer[..len]
    }

    /// Record a completed refill. Bytes past a short read are zeroed.
    pub(crate) fn refilled(&mut self, bytes: usize) {
        if bytes < self.buffer.len() {
            self.buffer[bytes..].fill(0);
        }
        if bytes < self.pending_rows * self.row_width {
            tracing::trace!(
                "Short refill: {} of {} bytes",
                bytes,
                self.pending_rows * self.row_width
            );
        }
        self.rows_in_buffer = self.pending_rows;
        self.next_slot = 0;
    }

    /// The loaded row, starting with its deletion flag
    pub(crate) fn row(&self) -> DbfResult<&[u8]> {
        if self.state != CursorState::Positioned {
            return Err(DbfError::no_row());
        }
        Ok(&self.buffer[self.current..self.current + self.row_span])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::column::{Column, ColumnKind};

    fn header(row_count: u32) -> Header {
        Header::new(
            vec![Column::new("A", ColumnKind::String, b'C', 0, 2, 0)],
            3,
            row_count,
            None,
        )
    }

    /// Drive the cursor over `data`, returning the live rows' bodies
    fn drain(cursor: &mut RowCursor, mut data: &[u8]) -> Vec<Vec<u8>> {
        let mut rows = Vec::new();
        loop {
            match cursor.step() {
                Step::Refill => {
                    let target = cursor.refill_target();
                    let n = target.len().min(data.len());
                    target[..n].copy_from_slice(&data[..n]);
                    data = &data[n..];
                    cursor.refilled(n);
                }
                Step::Deleted => continue,
                Step::Loaded => rows.push(cursor.row().unwrap()[1..].to_vec()),
                Step::Exhausted => return rows,
            }
        }
    }

    #[test]
    fn test_buffer_sizing() {
        let options = ReaderOptions::default();
        let cursor = RowCursor::new(&header(10), &options);
        assert_eq!(cursor.rows_per_buffer(), 3);

        let cursor = RowCursor::new(&header(10), &options.io_chunk_size(2));
        assert_eq!(cursor.rows_per_buffer(), 1);
    }

    #[test]
    fn test_steps_through_rows() {
        let mut cursor = RowCursor::new(&header(4), &ReaderOptions::default());
        assert!(cursor.row().is_err());

        let rows = drain(&mut cursor, b" aa bb*cc dd");
        assert_eq!(rows, vec![b"aa".to_vec(), b"bb".to_vec(), b"dd".to_vec()]);
        assert_eq!(cursor.state(), CursorState::AtEnd);
        assert_eq!(cursor.consumed(), 4);
        assert!(cursor.row().is_err());
    }

    #[test]
    fn test_refill_never_reads_past_last_row() {
        let mut cursor = RowCursor::new(&header(4), &ReaderOptions::default());
        assert_eq!(cursor.step(), Step::Refill);
        assert_eq!(cursor.refill_target().len(), 9);
        cursor.refilled(9);
        for _ in 0..3 {
            assert_eq!(cursor.step(), Step::Loaded);
        }
        assert_eq!(cursor.step(), Step::Refill);
        assert_eq!(cursor.refill_target().len(), 3);
    }

    #[test]
    fn test_truncated_rows_are_zeroed() {
        let mut cursor = RowCursor::new(&header(3), &ReaderOptions::default());
        let rows = drain(&mut cursor, b" aa b");
        assert_eq!(rows, vec![b"aa".to_vec(), b"b\0".to_vec(), b"\0\0".to_vec()]);
    }

    #[test]
    fn test_empty_table() {
        let mut cursor = RowCursor::new(&header(0), &ReaderOptions::default());
        assert_eq!(cursor.step(), Step::Exhausted);
        assert_eq!(cursor.state(), CursorState::AtEnd);
    }
}
