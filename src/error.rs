use std::path::PathBuf;
use thiserror::Error;

/// Custom Result type for this crate.
pub type Result<T> = std::result::Result<T, BatchError>;

/// The Error type for batch operations.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Configuration validation error: {0}")]
    ConfigValidationError(String),

    #[error("Input folder does not exist: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Input path is not a directory: {}", .0.display())]
    InputNotADirectory(PathBuf),

    #[error("Invalid file pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: globset::Error,
    },

    #[error(
        "Output name collision: '{first}' and '{second}' would both be written to '{output}'"
    )]
    OutputCollision {
        first: String,
        second: String,
        output: String,
    },

    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    /// Raised by the external watermark remover. This is the only variant the
    /// job runner contains at item granularity.
    #[error("{0}")]
    TransformError(String),

    #[error("Serialization/Deserialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl BatchError {
    /// True for errors detected by the cheap validation phase, before any
    /// collaborator is constructed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BatchError::ConfigError(_)
                | BatchError::ConfigValidationError(_)
                | BatchError::InputNotFound(_)
                | BatchError::InputNotADirectory(_)
                | BatchError::InvalidPattern { .. }
                | BatchError::OutputCollision { .. }
        )
    }
}

impl From<serde_yaml::Error> for BatchError {
    fn from(err: serde_yaml::Error) -> Self {
        BatchError::ConfigError(err.to_string())
    }
}
