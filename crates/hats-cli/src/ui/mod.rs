//! Terminal output.
//!
//! Progress from concurrent tasks reaches the terminal through one
//! [`Printer`] task; tables are rendered with comfy-table.

pub mod printer;
pub mod tables;

pub use printer::Printer;
