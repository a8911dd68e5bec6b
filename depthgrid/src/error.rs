//! Error types for the depth-grid primitives

use thiserror::Error;

/// Result type alias for the grid library
pub type Result<T> = std::result::Result<T, GridError>;

/// Errors raised while constructing grid primitives
#[derive(Error, Debug)]
pub enum GridError {
    #[error("Invalid frame dimensions: expected {expected} pixels, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Zero-sized frame: {width}x{height}")]
    ZeroSized { width: usize, height: usize },

    #[error("Invalid projection parameters: {0}")]
    InvalidProjection(String),
}

impl GridError {
    pub fn projection<S: Into<String>>(msg: S) -> Self {
        Self::InvalidProjection(msg.into())
    }
}
