//! Command-line entry points.

pub mod extract;
pub mod ocr;
pub mod remote;
pub mod schema;
