//! Table header - the preamble and column descriptor table of a .dbf file
//!
//! Layout consumed from the start of the stream:
//! - Offset 0x00: signature byte (ignored)
//! - Offset 0x01: last update as YY MM DD, YY counted from 1900
//! - Offset 0x04: row count (u32)
//! - Offset 0x08: header size (u16)
//! - Offset 0x0A: row width including the deletion flag (u16)
//! - Offset 0x0C: 20 reserved bytes
//! - Offset 0x20: 32-byte column descriptors, ended by 0x0D
//!
//! Column descriptor layout:
//! - Bytes 0-10: name, NUL/space padded
//! - Byte 11: native type code
//! - Bytes 12-15: reserved
//! - Byte 16: field size
//! - Byte 17: decimal count
//! - Bytes 18-31: reserved

use byteorder::{LittleEndian, ReadBytesExt};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::io::{Cursor, Read};

use super::column::{Column, ColumnKind};
use super::source::{self, Source};
use crate::error::{DbfError, DbfResult};

/// Byte ending the column descriptor table
pub const DESCRIPTOR_TERMINATOR: u8 = 0x0D;

/// Maps native type codes to column kinds while a header is loaded
pub trait HeaderLoader {
    fn column_kind(&self, native_type: u8) -> ColumnKind;
}

/// Standard dBASE type mapping. Unknown codes load as raw columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct DbaseHeaderLoader;

impl HeaderLoader for DbaseHeaderLoader {
    fn column_kind(&self, native_type: u8) -> ColumnKind {
        ColumnKind::from_native(native_type)
    }
}

/// dBASE mapping plus FoxPro `T` datetime fields
#[derive(Debug, Clone, Copy, Default)]
pub struct FoxProHeaderLoader;

impl HeaderLoader for FoxProHeaderLoader {
    fn column_kind(&self, native_type: u8) -> ColumnKind {
        match native_type {
            super::column::native::DATETIME => ColumnKind::FoxProDateTime,
            other => ColumnKind::from_native(other),
        }
    }
}

/// Immutable description of a table
#[derive(Debug, Clone)]
pub struct Header {
    columns: Vec<Column>,
    row_width: usize,
    row_count: u32,
    last_modified: Option<NaiveDate>,
    header_size: u16,
}

impl Header {
    /// Size of the fixed preamble
    pub const PREAMBLE_SIZE: usize = 32;

    pub fn new(
        columns: Vec<Column>,
        row_width: usize,
        row_count: u32,
        last_modified: Option<NaiveDate>,
    ) -> Self {
        let header_size = Self::PREAMBLE_SIZE + columns.len() * Column::DESCRIPTOR_SIZE + 1;
        Header {
            columns,
            row_width,
            row_count,
            last_modified,
            header_size: header_size.min(u16::MAX as usize) as u16,
        }
    }

    /// Load a header with the standard type mapping
    pub fn load<S: Source + ?Sized>(source: &mut S) -> DbfResult<Self> {
        Self::load_with(source, &DbaseHeaderLoader)
    }

    /// Load a header, mapping type codes through `loader`.
    ///
    /// The declared header size is honoured rather than ignored: bytes
    /// between the descriptor terminator and the declared end (a Visual
    /// FoxPro backlink, for one) are skipped so the stream is left at the
    /// first row. A declared size smaller than what was read skips nothing.
    pub fn load_with<S, L>(source: &mut S, loader: &L) -> DbfResult<Self>
    where
        S: Source + ?Sized,
        L: HeaderLoader + ?Sized,
    {
        let mut preamble = [0u8; Self::PREAMBLE_SIZE];
        source.read_exact(&mut preamble).map_err(DbfError::at_open)?;
        let mut builder = HeaderBuilder::from_preamble(&preamble)?;

        loop {
            let mut descriptor = [0u8; Column::DESCRIPTOR_SIZE];
            source.read_exact(&mut descriptor[..1]).map_err(DbfError::at_open)?;
            if descriptor[0] == DESCRIPTOR_TERMINATOR {
                break;
            }
            source.read_exact(&mut descriptor[1..]).map_err(DbfError::at_open)?;
            builder.push(&descriptor, loader);
        }

        let remaining = builder.remaining_header_bytes();
        if remaining > 0 {
            source::skip(source, remaining).map_err(DbfError::at_open)?;
        }
        Ok(builder.finish())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// First column with the given name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Position of the first column with the given name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Position of this exact column instance
    pub fn index_of(&self, column: &Column) -> Option<usize> {
        self.columns.iter().position(|c| std::ptr::eq(c, column))
    }

    /// Row width in bytes, including the deletion flag
    pub fn row_width(&self) -> usize {
        self.row_width
    }

    /// Number of rows, soft-deleted ones included
    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    pub fn last_modified(&self) -> Option<NaiveDate> {
        self.last_modified
    }

    /// Declared size of the header region
    pub fn header_size(&self) -> u16 {
        self.header_size
    }

    /// Bytes a row must span so every column can be sliced from it
    pub(crate) fn row_span(&self) -> usize {
        let extent = self.columns.iter().map(Column::end).max().unwrap_or(0);
        self.row_width.max(1 + extent)
    }
}

/// Something that identifies a column of a header: a name or an instance
pub trait ColumnRef {
    /// Position of the column in `header`
    fn resolve(&self, header: &Header) -> DbfResult<usize>;
}

impl ColumnRef for str {
    fn resolve(&self, header: &Header) -> DbfResult<usize> {
        if self.is_empty() {
            return Err(DbfError::InvalidArgument("column name is empty".to_string()));
        }
        header
            .column_index(self)
            .ok_or_else(|| DbfError::OutOfRange(format!("no column named '{}'", self)))
    }
}

impl ColumnRef for String {
    fn resolve(&self, header: &Header) -> DbfResult<usize> {
        self.as_str().resolve(header)
    }
}

impl ColumnRef for Column {
    fn resolve(&self, header: &Header) -> DbfResult<usize> {
        header.index_of(self).ok_or_else(|| {
            DbfError::OutOfRange(format!(
                "column '{}' does not belong to this table",
                self.name()
            ))
        })
    }
}

impl<C: ColumnRef + ?Sized> ColumnRef for &C {
    fn resolve(&self, header: &Header) -> DbfResult<usize> {
        (**self).resolve(header)
    }
}

/// Incremental header parser shared by the blocking and async loaders
pub(crate) struct HeaderBuilder {
    columns: Vec<Column>,
    names: HashSet<String>,
    next_offset: usize,
    row_width: usize,
    row_count: u32,
    header_size: u16,
    last_modified: Option<NaiveDate>,
}

impl HeaderBuilder {
    pub(crate) fn from_preamble(data: &[u8; Header::PREAMBLE_SIZE]) -> DbfResult<Self> {
        let mut cursor = Cursor::new(&data[..]);
        let _signature = cursor.read_u8()?;
        let year = cursor.read_u8()?;
        let month = cursor.read_u8()?;
        let day = cursor.read_u8()?;
        let row_count = cursor.read_u32::<LittleEndian>()?;
        let header_size = cursor.read_u16::<LittleEndian>()?;
        let row_width = cursor.read_u16::<LittleEndian>()?;

        Ok(HeaderBuilder {
            columns: Vec::new(),
            names: HashSet::new(),
            next_offset: 0,
            row_width: row_width as usize,
            row_count,
            header_size,
            last_modified: NaiveDate::from_ymd_opt(1900 + year as i32, month as u32, day as u32),
        })
    }

    pub(crate) fn push<L: HeaderLoader + ?Sized>(
        &mut self,
        descriptor: &[u8; Column::DESCRIPTOR_SIZE],
        loader: &L,
    ) {
        let raw_name = &descriptor[..Column::NAME_SIZE];
        let name_len = raw_name.iter().position(|&b| b == 0).unwrap_or(Column::NAME_SIZE);
        let name = String::from_utf8_lossy(&raw_name[..name_len]).trim().to_string();

        let native_type = descriptor[11];
        let size = descriptor[16] as usize;
        let decimal_count = descriptor[17];
        let kind = loader.column_kind(native_type);

        if let ColumnKind::Raw(code) = kind {
            tracing::debug!(
                "Column '{}' has unsupported type {:?}, reading raw bytes",
                name,
                code as char
            );
        }
        if !self.names.insert(name.clone()) {
            tracing::warn!("Duplicate column name '{}', lookups by name use the first", name);
        }

        self.columns.push(Column::new(
            name,
            kind,
            native_type,
            self.next_offset,
            size,
            decimal_count,
        ));
        self.next_offset += size;
    }

    /// Bytes left between the terminator and the declared header end
    pub(crate) fn remaining_header_bytes(&self) -> u64 {
        let consumed = Header::PREAMBLE_SIZE + self.columns.len() * Column::DESCRIPTOR_SIZE + 1;
        (self.header_size as u64).saturating_sub(consumed as u64)
    }

    pub(crate) fn finish(self) -> Header {
        if self.row_width != self.next_offset + 1 {
            tracing::warn!(
                "Row width {} does not match column layout ({} bytes + deletion flag)",
                self.row_width,
                self.next_offset
            );
        }
        tracing::debug!(
            "Loaded header: {} columns, {} rows of {} bytes",
            self.columns.len(),
            self.row_count,
            self.row_width
        );

        Header {
            columns: self.columns,
            row_width: self.row_width,
            row_count: self.row_count,
            last_modified: self.last_modified,
            header_size: self.header_size,
        }
    }
}

#[cfg(feature = "async")]
mod async_load {
    use tokio::io::AsyncReadExt;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::storage::source::{cancellable, skip_async, AsyncSource};

    impl Header {
        /// Async form of [`Header::load_with`]. The cancellation token, if
        /// given, interrupts only the stream read in progress.
        pub async fn load_async<S, L>(
            source: &mut S,
            loader: &L,
            cancel: Option<&CancellationToken>,
        ) -> DbfResult<Self>
        where
            S: AsyncSource + ?Sized,
            L: HeaderLoader + ?Sized,
        {
            let mut preamble = [0u8; Header::PREAMBLE_SIZE];
            cancellable(cancel, source.read_exact(&mut preamble), DbfError::at_open).await?;
            let mut builder = HeaderBuilder::from_preamble(&preamble)?;

            loop {
                let mut descriptor = [0u8; Column::DESCRIPTOR_SIZE];
                cancellable(cancel, source.read_exact(&mut descriptor[..1]), DbfError::at_open)
                    .await?;
                if descriptor[0] == DESCRIPTOR_TERMINATOR {
                    break;
                }
                cancellable(cancel, source.read_exact(&mut descriptor[1..]), DbfError::at_open)
                    .await?;
                builder.push(&descriptor, loader);
            }

            let remaining = builder.remaining_header_bytes();
            if remaining > 0 {
                cancellable(cancel, skip_async(source, remaining), DbfError::at_open).await?;
            }
            Ok(builder.finish())
        }
    }
}
