//! Error types for the hand tracking pipeline

use thiserror::Error;

/// Result type alias for the hand tracking library
pub type Result<T> = std::result::Result<T, HandTrackerError>;

/// Errors surfaced by the hand tracking core
#[derive(Error, Debug)]
pub enum HandTrackerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Grid error: {0}")]
    GridError(#[from] depthgrid::GridError),

    #[error("Settings serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl HandTrackerError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }
}
