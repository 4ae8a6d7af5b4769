//! Unified error type for the adapter
//!
//! Every fault is scoped to a single connection; nothing in this crate
//! aborts the process. Protocol-level surprises (events in unexpected
//! endpoint states) are logged rather than raised, so the error type only
//! covers the operations that can actually fail: socket establishment,
//! listening, and configuration.

use thiserror::Error;

/// Unified error type for adapter operations.
#[derive(Debug, Clone, Error)]
pub enum TetherError {
    /// Failed to establish or accept a socket.
    #[error("Connect error: {message}")]
    Connect {
        /// Description of the connection failure.
        message: String,
    },

    /// Failed to bind or drive a listening socket.
    #[error("Listen error: {message}")]
    Listen {
        /// Description of the listener failure.
        message: String,
    },

    /// Invalid options supplied by the application.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem.
        message: String,
    },
}

impl TetherError {
    /// Create a connect error.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Create a listen error.
    pub fn listen(message: impl Into<String>) -> Self {
        Self::Listen {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for TetherError {
    fn from(err: std::io::Error) -> Self {
        Self::connect(err.to_string())
    }
}

/// Standard Result type for adapter operations.
pub type Result<T> = std::result::Result<T, TetherError>;
