//! Reader - forward-only row access over an open table
//!
//! `read` and `read_async` drive the same [`RowCursor`]; they differ only in
//! how the buffer refill is performed. Column getters decode straight from
//! the buffered row, so columns can be read in any order and any number of
//! times while the row is loaded.

use chrono::{NaiveDate, NaiveDateTime};
use encoding_rs::Encoding;
use rust_decimal::Decimal;
use std::sync::{Arc, Weak};

use crate::config::ReaderOptions;
use crate::error::{DbfError, DbfResult};
use crate::storage::column::Column;
use crate::storage::header::{ColumnRef, Header};
use crate::storage::layout::BufferLayout;
use crate::storage::source::{self, Source};
use crate::storage::value::{SemanticType, Value};
use crate::table::cursor::{CursorState, RowCursor, Step};
use crate::table::open_table::Shared;

/// Row reader handed out by [`Table::open_reader`](crate::Table::open_reader)
#[derive(Debug)]
pub struct Reader<S> {
    header: Arc<Header>,
    table: Weak<Shared<S>>,
    cursor: RowCursor,
    options: ReaderOptions,
}

impl<S> Reader<S> {
    pub(crate) fn new(header: Arc<Header>, table: Weak<Shared<S>>, options: ReaderOptions) -> Self {
        let cursor = RowCursor::new(&header, &options);
        Reader {
            header,
            table,
            cursor,
            options,
        }
    }

    pub(crate) fn rows_per_buffer(&self) -> usize {
        self.cursor.rows_per_buffer()
    }

    /// The owning table's shared state, if it is still open
    fn live(&self) -> DbfResult<Arc<Shared<S>>> {
        let shared = self.table.upgrade().ok_or(DbfError::Disposed("table"))?;
        shared.ensure_open()?;
        Ok(shared)
    }

    pub fn header(&self) -> DbfResult<&Header> {
        self.live()?;
        Ok(&self.header)
    }

    pub fn columns(&self) -> DbfResult<&[Column]> {
        Ok(self.header()?.columns())
    }

    pub fn last_modified(&self) -> DbfResult<Option<NaiveDate>> {
        Ok(self.header()?.last_modified())
    }

    pub fn encoding(&self) -> DbfResult<&'static Encoding> {
        self.live()?;
        Ok(self.options.encoding)
    }

    pub fn state(&self) -> DbfResult<CursorState> {
        self.live()?;
        Ok(self.cursor.state())
    }

    /// Decode a column of the loaded row
    pub fn get_value<C: ColumnRef + ?Sized>(&self, column: &C) -> DbfResult<Option<Value>> {
        let (column, row) = self.locate(column)?;
        column.decode(row, 1 + column.offset(), self.options.encoding)
    }

    pub fn get_string<C: ColumnRef + ?Sized>(&self, column: &C) -> DbfResult<Option<String>> {
        Ok(match self.typed(column, SemanticType::String)? {
            Some(Value::String(v)) => Some(v),
            _ => None,
        })
    }

    pub fn get_date<C: ColumnRef + ?Sized>(&self, column: &C) -> DbfResult<Option<NaiveDate>> {
        Ok(match self.typed(column, SemanticType::Date)? {
            Some(Value::Date(v)) => Some(v),
            _ => None,
        })
    }

    pub fn get_boolean<C: ColumnRef + ?Sized>(&self, column: &C) -> DbfResult<Option<bool>> {
        Ok(match self.typed(column, SemanticType::Boolean)? {
            Some(Value::Boolean(v)) => Some(v),
            _ => None,
        })
    }

    pub fn get_int32<C: ColumnRef + ?Sized>(&self, column: &C) -> DbfResult<Option<i32>> {
        Ok(match self.typed(column, SemanticType::Integer32)? {
            Some(Value::Integer(v)) => Some(v),
            _ => None,
        })
    }

    pub fn get_decimal<C: ColumnRef + ?Sized>(&self, column: &C) -> DbfResult<Option<Decimal>> {
        Ok(match self.typed(column, SemanticType::Decimal)? {
            Some(Value::Decimal(v)) => Some(v),
            _ => None,
        })
    }

    /// FoxPro `T` columns; see [`FoxProHeaderLoader`](crate::FoxProHeaderLoader)
    pub fn get_date_time<C: ColumnRef + ?Sized>(
        &self,
        column: &C,
    ) -> DbfResult<Option<NaiveDateTime>> {
        Ok(match self.typed(column, SemanticType::DateTime)? {
            Some(Value::DateTime(v)) => Some(v),
            _ => None,
        })
    }

    /// Copy a raw column's bytes into `dest[offset..]`. Returns the number
    /// of bytes copied, 0 if the value is absent.
    pub fn get_bytes<C: ColumnRef + ?Sized>(
        &self,
        column: &C,
        dest: &mut [u8],
        offset: usize,
    ) -> DbfResult<usize> {
        let bytes = match self.typed(column, SemanticType::Raw)? {
            Some(Value::Raw(bytes)) => bytes,
            _ => return Ok(0),
        };
        if offset > dest.len() {
            return Err(DbfError::OutOfRange(format!(
                "offset {} is beyond a {} byte buffer",
                offset,
                dest.len()
            )));
        }
        if bytes.len() > dest.len() - offset {
            return Err(DbfError::OutOfRange(format!(
                "{} bytes do not fit at offset {} of a {} byte buffer",
                bytes.len(),
                offset,
                dest.len()
            )));
        }
        dest[offset..offset + bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    /// Copy the loaded row's selected columns into `packed`
    pub fn project(&self, layout: &BufferLayout, packed: &mut [u8]) -> DbfResult<()> {
        self.live()?;
        layout.apply(self.cursor.row()?, packed)
    }

    fn locate<C: ColumnRef + ?Sized>(&self, column: &C) -> DbfResult<(&Column, &[u8])> {
        self.live()?;
        let row = self.cursor.row()?;
        let index = column.resolve(&self.header)?;
        Ok((&self.header.columns()[index], row))
    }

    fn typed<C: ColumnRef + ?Sized>(
        &self,
        column: &C,
        requested: SemanticType,
    ) -> DbfResult<Option<Value>> {
        let (column, row) = self.locate(column)?;
        if column.semantic_type() != requested {
            return Err(DbfError::OutOfRange(format!(
                "column '{}' holds {} values, not {}",
                column.name(),
                column.semantic_type(),
                requested
            )));
        }
        column.decode(row, 1 + column.offset(), self.options.encoding)
    }

    fn trace_step(&self, step: Step) {
        match step {
            Step::Deleted => {
                tracing::trace!("Skipped deleted row {}", self.cursor.consumed())
            }
            Step::Exhausted => tracing::trace!("Reader exhausted"),
            _ => {}
        }
    }
}

impl<S: Source> Reader<S> {
    /// Advance to the next live row. Returns false once all rows are consumed.
    pub fn read(&mut self) -> DbfResult<bool> {
        let shared = self.live()?;
        loop {
            let step = self.cursor.step();
            self.trace_step(step);
            match step {
                Step::Loaded => return Ok(true),
                Step::Exhausted => return Ok(false),
                Step::Deleted => continue,
                Step::Refill => {
                    let mut guard = shared.source.lock();
                    let stream = guard.as_mut().ok_or(DbfError::Disposed("table"))?;
                    let target = self.cursor.refill_target();
                    tracing::trace!("Refilling {} bytes", target.len());
                    let n = source::fill(stream, target)?;
                    self.cursor.refilled(n);
                }
            }
        }
    }
}

#[cfg(feature = "async")]
mod async_read {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::storage::source::{cancellable, fill_async, AsyncSource};

    /// Holds the stream outside the table's lock for the length of one
    /// async refill. Dropping the lease hands the stream back, or closes it
    /// if the table was closed in the meantime.
    struct Lease<'a, S> {
        shared: &'a Shared<S>,
        stream: Option<S>,
    }

    impl<'a, S> Lease<'a, S> {
        fn take(shared: &'a Shared<S>) -> DbfResult<Self> {
            let stream = shared.source.lock().take().ok_or(DbfError::Disposed("table"))?;
            Ok(Lease {
                shared,
                stream: Some(stream),
            })
        }

        fn stream(&mut self) -> DbfResult<&mut S> {
            self.stream.as_mut().ok_or(DbfError::Disposed("table"))
        }
    }

    impl<S> Drop for Lease<'_, S> {
        fn drop(&mut self) {
            if let Some(stream) = self.stream.take() {
                let mut slot = self.shared.source.lock();
                if !self.shared.is_disposed() {
                    *slot = Some(stream);
                }
            }
        }
    }

    impl<S: AsyncSource> Reader<S> {
        /// Async form of [`Reader::read`]
        pub async fn read_async(&mut self) -> DbfResult<bool> {
            self.read_async_with(None).await
        }

        /// Async form of [`Reader::read`]. The cancellation token, if given,
        /// interrupts only a refill in progress; bytes it already consumed
        /// stay consumed.
        pub async fn read_async_with(
            &mut self,
            cancel: Option<&CancellationToken>,
        ) -> DbfResult<bool> {
            let shared = self.live()?;
            loop {
                let step = self.cursor.step();
                self.trace_step(step);
                match step {
                    Step::Loaded => return Ok(true),
                    Step::Exhausted => return Ok(false),
                    Step::Deleted => continue,
                    Step::Refill => {
                        let mut lease = Lease::take(&shared)?;
                        let stream = lease.stream()?;
                        let target = self.cursor.refill_target();
                        tracing::trace!("Refilling {} bytes", target.len());
                        let n = cancellable(cancel, fill_async(stream, target), DbfError::Io).await?;
                        self.cursor.refilled(n);
                    }
                }
            }
        }
    }
}
