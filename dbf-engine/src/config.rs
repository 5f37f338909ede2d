//! Reader configuration
//!
//! Options are passed explicitly when a reader is opened. They can also be
//! loaded from TOML:
//!
//! ```toml
//! encoding = "windows-1252"
//! io_chunk_size = 8192
//! max_buffered_rows = 3
//! ```

use encoding_rs::{Encoding, UTF_8};
use serde::{Deserialize, Deserializer};

use crate::error::{DbfError, DbfResult};

/// Options controlling how a reader decodes and buffers rows
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Text encoding used for character, date and numeric fields
    #[serde(deserialize_with = "deserialize_encoding")]
    pub encoding: &'static Encoding,

    /// I/O chunk threshold in bytes (default: 4096). A row wider than this
    /// is buffered alone.
    pub io_chunk_size: usize,

    /// Maximum number of rows fetched per refill (default: 3)
    pub max_buffered_rows: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            encoding: UTF_8,
            io_chunk_size: 4096,
            max_buffered_rows: 3,
        }
    }
}

impl ReaderOptions {
    /// Create options with the given encoding and default buffering
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            encoding,
            ..Default::default()
        }
    }

    /// Resolve an encoding by its WHATWG label (`"cp1252"`, `"utf-8"`, ...)
    pub fn with_encoding_label(label: &str) -> DbfResult<Self> {
        Ok(Self::new(encoding_for_label(label)?))
    }

    /// Set the I/O chunk threshold
    pub fn io_chunk_size(mut self, size: usize) -> Self {
        self.io_chunk_size = size;
        self
    }

    /// Set the maximum number of rows per refill
    pub fn max_buffered_rows(mut self, rows: usize) -> Self {
        self.max_buffered_rows = rows;
        self
    }

    /// Parse options from a TOML document
    pub fn from_toml_str(text: &str) -> DbfResult<Self> {
        let options: ReaderOptions = toml::from_str(text)
            .map_err(|e| DbfError::InvalidArgument(format!("reader options: {}", e.message())))?;
        options.validate()?;
        Ok(options)
    }

    pub(crate) fn validate(&self) -> DbfResult<()> {
        if self.io_chunk_size == 0 {
            return Err(DbfError::InvalidArgument(
                "io_chunk_size must be positive".to_string(),
            ));
        }
        if self.max_buffered_rows == 0 {
            return Err(DbfError::InvalidArgument(
                "max_buffered_rows must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of whole rows one refill may hold for the given row width
    pub(crate) fn rows_per_buffer(&self, row_width: usize) -> usize {
        if row_width > self.io_chunk_size {
            1
        } else {
            (self.io_chunk_size / row_width.max(1)).clamp(1, self.max_buffered_rows)
        }
    }
}

fn encoding_for_label(label: &str) -> DbfResult<&'static Encoding> {
    if label.trim().is_empty() {
        return Err(DbfError::InvalidArgument("encoding label is empty".to_string()));
    }
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| DbfError::InvalidArgument(format!("unknown encoding '{}'", label)))
}

fn deserialize_encoding<'de, D>(deserializer: D) -> Result<&'static Encoding, D::Error>
where
    D: Deserializer<'de>,
{
    let label = String::deserialize(deserializer)?;
    encoding_for_label(&label).map_err(serde::de::Error::custom)
}
