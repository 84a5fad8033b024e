//! companion-shared: identifiers, message types, and constants shared by the
//! crypto and store crates.

pub mod api;
pub mod constants;
pub mod error;
pub mod ids;
