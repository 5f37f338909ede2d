//! Storage layer - the on-disk .dbf format
//!
//! - `source`: stream abstraction with seek-or-discard skipping
//! - `header`: table header and column descriptor loading
//! - `column`: column kinds and per-kind field decoders
//! - `value`: decoded field values
//! - `layout`: copy/skip plans for extracting selected columns

pub mod column;
pub mod header;
pub mod layout;
pub mod source;
pub mod value;

pub use column::{Column, ColumnKind};
pub use header::{ColumnRef, DbaseHeaderLoader, FoxProHeaderLoader, Header, HeaderLoader};
pub use layout::{BufferLayout, FillInstruction};
pub use source::{Forward, Seekable, Source};
pub use value::{SemanticType, Value};

#[cfg(feature = "async")]
pub use source::{AsyncForward, AsyncSeekable, AsyncSource};
