//! Deterministic logic with no I/O.

pub mod detect;
pub mod extract;
pub mod ndjson;
pub mod path;
pub mod reveal;
pub mod review;
pub mod snapshot;
pub mod types;
