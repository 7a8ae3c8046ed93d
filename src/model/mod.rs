//! # Result Model
//!
//! Plain data that crosses every boundary: executor ↔ summarizer ↔ engine ↔ API.
//! No I/O, no state, no async.

pub mod row;
pub mod value;

pub use row::Row;
pub use value::Value;
