//! # Decoded Value Types
//!
//! Runtime representation of decoded cell values. The decoder produces
//! [`Value`]s; the SQLite binder dispatches on the tag.

mod value;

pub use value::Value;
