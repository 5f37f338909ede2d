//! Error handling for the dBASE decoder
//!
//! Every failure is reported synchronously at the point of misuse. Short
//! reads while skipping or filling are not errors; they end the operation.

use thiserror::Error;

/// Flat error category, independent of the message payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required input was missing or empty
    InvalidArgument,
    /// Unknown column, foreign column, type mismatch or bad buffer bounds
    OutOfRange,
    /// The stream could not be read at open time
    UnreadableSource,
    /// The table (or its reader) has been closed
    Disposed,
    /// No row loaded, or a second reader was requested
    InvalidState,
    /// Field or header contents are malformed
    Format,
    /// Async I/O was interrupted by a cancellation token
    Cancelled,
    /// Underlying I/O failure after open
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::OutOfRange => "out of range",
            ErrorKind::UnreadableSource => "unreadable source",
            ErrorKind::Disposed => "disposed",
            ErrorKind::InvalidState => "invalid state",
            ErrorKind::Format => "format error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Io => "I/O error",
        })
    }
}

/// Main error type for the dBASE engine
#[derive(Error, Debug)]
pub enum DbfError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Unreadable source: {0}")]
    UnreadableSource(#[source] std::io::Error),

    #[error("Cannot access a disposed {0}")]
    Disposed(&'static str),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbfError {
    /// Get the category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbfError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            DbfError::OutOfRange(_) => ErrorKind::OutOfRange,
            DbfError::UnreadableSource(_) => ErrorKind::UnreadableSource,
            DbfError::Disposed(_) => ErrorKind::Disposed,
            DbfError::InvalidState(_) => ErrorKind::InvalidState,
            DbfError::Format(_) => ErrorKind::Format,
            DbfError::Cancelled => ErrorKind::Cancelled,
            DbfError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn no_row() -> Self {
        DbfError::InvalidState("no row is loaded; call read() first".to_string())
    }

    /// Errors raised while loading the header are reported as an unreadable
    /// source, except for a truncated preamble which is a format problem.
    pub(crate) fn at_open(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            DbfError::Format("stream ended inside the table header".to_string())
        } else {
            DbfError::UnreadableSource(err)
        }
    }
}

/// Result type for dBASE operations
pub type DbfResult<T> = Result<T, DbfError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(DbfError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(DbfError::Disposed("table").kind(), ErrorKind::Disposed);
        assert_eq!(DbfError::no_row().kind(), ErrorKind::InvalidState);
        let io_err = DbfError::from(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(io_err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_open_errors() {
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "short");
        assert_eq!(DbfError::at_open(eof).kind(), ErrorKind::Format);

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "closed");
        assert_eq!(DbfError::at_open(denied).kind(), ErrorKind::UnreadableSource);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            DbfError::Disposed("reader").to_string(),
            "Cannot access a disposed reader"
        );
        assert_eq!(ErrorKind::OutOfRange.to_string(), "out of range");
    }
}
