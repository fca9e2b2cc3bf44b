//! Common error types for mediaguard

use thiserror::Error;

/// Common result type for mediaguard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across mediaguard services
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
