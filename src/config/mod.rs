//! Configuration model for cachelock.
//!
//! This module defines the Config struct loaded from a YAML file.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for optional fields, and validation of config values.

mod model;
mod operations;


// Re-export public API
pub use model::Config;
