//! # mediaguard common library
//!
//! Shared code for the mediaguard services:
//! - Error and result types
//! - Bootstrap configuration (TOML file, environment, compiled defaults)

pub mod config;
pub mod error;

pub use config::{DetectionSettings, LoggingConfig, TomlConfig};
pub use error::{Error, Result};
