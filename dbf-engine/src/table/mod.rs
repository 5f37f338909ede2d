//! Table layer - open tables and their row readers
//!
//! A [`Table`] owns its stream and hands out one [`Reader`] over its
//! lifetime. The reader walks rows front to back through a buffering
//! [`cursor`] shared by the blocking and async read paths.

pub mod cursor;
pub mod open_table;
pub mod reader;

pub use cursor::CursorState;
pub use open_table::Table;
pub use reader::Reader;
