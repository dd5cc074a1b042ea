//! Configuration module for Moebius
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use moebius::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("moebius.toml")).unwrap();
//! println!("Selecting every {}s", config.dispatch.select_interval_secs);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, DispatchConfig, FetcherConfig, PolicyConfig, SeedEntry, StoreConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
