//! dBASE Engine - forward-only streaming decoder for dBASE (.dbf) tables
//!
//! This crate reads the header and column descriptors of a .dbf table from
//! any byte stream, then streams its rows through a small row buffer,
//! skipping soft-deleted rows and decoding fields on demand.
//!
//! ```no_run
//! use dbf_engine::{DbfResult, Table};
//!
//! fn print_names() -> DbfResult<()> {
//!     let table = Table::open_path("customers.dbf")?;
//!     let mut reader = table.open_reader()?;
//!     while reader.read()? {
//!         println!("{:?}", reader.get_string("NAME")?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! With the `async` feature (on by default) every blocking entry point has
//! an async counterpart built on tokio.

pub mod config;
pub mod error;
pub mod storage;
pub mod table;

#[cfg(test)]
pub(crate) mod testing;

pub use config::ReaderOptions;
pub use error::{DbfError, DbfResult, ErrorKind};
pub use storage::{
    BufferLayout, Column, ColumnKind, ColumnRef, DbaseHeaderLoader, FoxProHeaderLoader, Header,
    HeaderLoader, SemanticType, Value,
};
pub use table::{CursorState, Reader, Table};
