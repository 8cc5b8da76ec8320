//! Completion Post-Processing
//!
//! Backend text completions are turned into JSON values here; schema checks
//! happen afterwards in [`crate::ai::schema`].

mod json_repair;

pub use json_repair::{extract_json_from_response, parse_with_repair};
