//! Download pipeline - paginated fetch, aggregation, shaping and pivoting
//! of upstream water-resources data

pub mod aggregate;
pub mod catalog;
pub mod download;
pub mod fetch;
pub mod parse;
pub mod pivot;
pub mod shape;
pub mod table;
pub mod types;
pub mod utils;
pub mod write;

pub use table::Table;
pub use types::*;
