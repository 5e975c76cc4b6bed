//! Configuration module for Roll-Harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use roll_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Data directory: {}", config.storage.data_dir);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CaptchaConfig, Config, ConversionConfig, EndpointConfig, RemoteBackend, RemoteConfig,
    ResponseMarkers, RetryConfig, SessionConfig, SourceConfig, StorageConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
