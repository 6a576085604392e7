//! Error types for the Scanguard service.

use thiserror::Error;

/// Main error type for Scanguard operations.
///
/// Admission decisions themselves never fail; these errors only come from
/// loading configuration and running the HTTP listener.
#[derive(Error, Debug)]
pub enum ScanguardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ScanguardError {
    fn from(err: config::ConfigError) -> Self {
        ScanguardError::Config(err.to_string())
    }
}

/// Result type alias for Scanguard operations.
pub type Result<T> = std::result::Result<T, ScanguardError>;
