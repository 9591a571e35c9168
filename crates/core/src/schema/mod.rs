//! Schema module for Tarn.
//!
//! Mirrored tables declare ordered, typed columns and a single primary-key column.

mod column;
mod table;

pub use column::Column;
pub use table::{Table, TableBuilder};
