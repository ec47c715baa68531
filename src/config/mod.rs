//! Configuration module for Canvas-Extract
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! The resulting [`Config`] is built once by the caller and passed explicitly
//! into the extraction entry point.
//!
//! # Example
//!
//! ```no_run
//! use canvas_extract::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("canvas.toml")).unwrap();
//! println!("Extracting account {}", config.canvas.account_id);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{CanvasConfig, Config, ExtractionConfig, OutputConfig, RetryConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
