//! Open table - owns the input stream and hands out its single reader

use chrono::NaiveDate;
use encoding_rs::{Encoding, UTF_8};
use parking_lot::Mutex;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::config::ReaderOptions;
use crate::error::{DbfError, DbfResult};
use crate::storage::column::Column;
use crate::storage::header::{DbaseHeaderLoader, Header, HeaderLoader};
use crate::storage::source::Source;
use crate::table::reader::Reader;

/// State shared between a table and its reader
#[derive(Debug)]
pub(crate) struct Shared<S> {
    /// The owned stream; `None` once closed, or while an async refill holds it
    pub(crate) source: Mutex<Option<S>>,
    disposed: AtomicBool,
    reader_opened: AtomicBool,
    encoding: OnceLock<&'static Encoding>,
}

impl<S> Shared<S> {
    fn new(source: S) -> Self {
        Shared {
            source: Mutex::new(Some(source)),
            disposed: AtomicBool::new(false),
            reader_opened: AtomicBool::new(false),
            encoding: OnceLock::new(),
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> DbfResult<()> {
        if self.is_disposed() {
            return Err(DbfError::Disposed("table"));
        }
        Ok(())
    }

    /// Close the stream. Returns false if it was already closed.
    fn close(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        drop(self.source.lock().take());
        true
    }
}

/// A dBASE table opened over a stream
///
/// The table owns its stream until it is closed or dropped. Every accessor
/// fails with [`DbfError::Disposed`] once the table is closed, and so does
/// every operation on its reader.
#[derive(Debug)]
pub struct Table<S> {
    header: Arc<Header>,
    shared: Arc<Shared<S>>,
}

impl<S> Table<S> {
    fn from_parts(header: Header, source: S) -> Self {
        Table {
            header: Arc::new(header),
            shared: Arc::new(Shared::new(source)),
        }
    }

    pub fn header(&self) -> DbfResult<&Header> {
        self.shared.ensure_open()?;
        Ok(&self.header)
    }

    pub fn columns(&self) -> DbfResult<&[Column]> {
        Ok(self.header()?.columns())
    }

    pub fn last_modified(&self) -> DbfResult<Option<NaiveDate>> {
        Ok(self.header()?.last_modified())
    }

    /// Encoding of the table's reader, or UTF-8 if none was opened yet
    pub fn encoding(&self) -> DbfResult<&'static Encoding> {
        self.shared.ensure_open()?;
        Ok(self.shared.encoding.get().copied().unwrap_or(UTF_8))
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Open the reader with default options (UTF-8)
    pub fn open_reader(&self) -> DbfResult<Reader<S>> {
        self.open_reader_with(ReaderOptions::default())
    }

    /// Open the reader. A table has at most one reader over its lifetime.
    pub fn open_reader_with(&self, options: ReaderOptions) -> DbfResult<Reader<S>> {
        self.shared.ensure_open()?;
        options.validate()?;
        if self.shared.reader_opened.swap(true, Ordering::AcqRel) {
            return Err(DbfError::InvalidState(
                "a reader has already been opened on this table".to_string(),
            ));
        }
        let _ = self.shared.encoding.set(options.encoding);

        let reader = Reader::new(Arc::clone(&self.header), Arc::downgrade(&self.shared), options);
        tracing::debug!(
            "Opened reader: encoding {}, {} rows per refill",
            options.encoding.name(),
            reader.rows_per_buffer()
        );
        Ok(reader)
    }

    /// Close the table and its stream. Closing twice is a no-op.
    pub fn close(&self) {
        if self.shared.close() {
            tracing::debug!("Closed table");
        }
    }
}

impl<S> Drop for Table<S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<S: Source> Table<S> {
    /// Open a table, loading its header with [`DbaseHeaderLoader`]
    pub fn open(source: S) -> DbfResult<Self> {
        Self::open_with(source, &DbaseHeaderLoader)
    }

    /// Open a table with a custom header loader
    pub fn open_with<L: HeaderLoader + ?Sized>(mut source: S, loader: &L) -> DbfResult<Self> {
        let header = Header::load_with(&mut source, loader)?;
        Ok(Self::from_parts(header, source))
    }
}

impl Table<File> {
    /// Open a .dbf file
    pub fn open_path<P: AsRef<Path>>(path: P) -> DbfResult<Self> {
        Self::open_path_with(path, &DbaseHeaderLoader)
    }

    pub fn open_path_with<P, L>(path: P, loader: &L) -> DbfResult<Self>
    where
        P: AsRef<Path>,
        L: HeaderLoader + ?Sized,
    {
        let file = File::open(path.as_ref()).map_err(DbfError::UnreadableSource)?;
        Self::open_with(file, loader)
    }
}

#[cfg(feature = "async")]
mod async_open {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::storage::source::AsyncSource;

    impl<S: AsyncSource> Table<S> {
        /// Async form of [`Table::open`]
        pub async fn open_async(source: S) -> DbfResult<Self> {
            Self::open_async_with(source, &DbaseHeaderLoader, None).await
        }

        /// Async form of [`Table::open_with`]. The cancellation token, if
        /// given, interrupts the header read in progress.
        pub async fn open_async_with<L: HeaderLoader + ?Sized>(
            mut source: S,
            loader: &L,
            cancel: Option<&CancellationToken>,
        ) -> DbfResult<Self> {
            let header = Header::load_async(&mut source, loader, cancel).await?;
            Ok(Self::from_parts(header, source))
        }
    }

    impl Table<tokio::fs::File> {
        /// Async form of [`Table::open_path`]
        pub async fn open_path_async<P: AsRef<Path>>(
            path: P,
            cancel: Option<&CancellationToken>,
        ) -> DbfResult<Self> {
            let file = tokio::fs::File::open(path.as_ref())
                .await
                .map_err(DbfError::UnreadableSource)?;
            Self::open_async_with(file, &DbaseHeaderLoader, cancel).await
        }
    }
}
