//! Query Execution Module
//!
//! Glue between the query shell and the Flight SQL query path.
//!
//! # Components
//!
//! - **ResultConverter** - Builds parameter batches from JSON values and renders
//!   result batches as JSON rows

pub mod result_converter;

pub use result_converter::{ConversionError, JsonRow, ResultConverter};
