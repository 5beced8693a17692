//! Error types for radarlink.
//!
//! Malformed frames never show up here: the decoder drops them. Everything
//! that does reach this enum is reported and the pipeline keeps running.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for radarlink operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Link Errors ===
    /// The hardware link could not be opened.
    #[error("failed to open link '{port}': {message}")]
    LinkOpen {
        /// Port name or link identifier.
        port: String,
        /// Description of what went wrong.
        message: String,
    },

    /// Reading from an open link failed.
    #[error("link read failed: {0}")]
    LinkRead(#[source] std::io::Error),

    // === Store Errors ===
    /// The history log could not be read.
    #[error("failed to read history log {path}: {source}")]
    StoreRead {
        /// Path to the log file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The history log could not be written.
    #[error("failed to write history log {path}: {source}")]
    StoreWrite {
        /// Path to the log file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The history log does not contain a JSON array of samples.
    #[error("history log {path} is corrupt: {source}")]
    StoreCorrupt {
        /// Path to the log file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The single-writer queue rejected a sample.
    #[error("history queue unavailable: {0}")]
    StoreQueue(String),

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Controller Errors ===
    /// The mode controller task has stopped.
    #[error("mode controller is not running")]
    ControllerGone,

    // === I/O Errors ===
    /// File system or socket operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for radarlink operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a link open error.
    #[must_use]
    pub fn link_open(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LinkOpen {
            port: port.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error came from the hardware link.
    #[must_use]
    pub fn is_link_error(&self) -> bool {
        matches!(self, Self::LinkOpen { .. } | Self::LinkRead(_))
    }

    /// Check if this error came from the history log.
    #[must_use]
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            Self::StoreRead { .. }
                | Self::StoreWrite { .. }
                | Self::StoreCorrupt { .. }
                | Self::StoreQueue(_)
        )
    }
}
