//! Error types for the engine boundary runtime

use thiserror::Error;

/// Result type for engine boundary operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur at the engine boundary
#[derive(Debug, Error)]
pub enum EngineError {
    /// An operation was attempted on an invalid or already-released handle.
    /// Rejected locally, never forwarded to the engine.
    #[error("Invalid handle: {message}")]
    InvalidHandle { message: String },

    /// The engine reported a failure for a previously issued request.
    /// Never retried automatically by this layer.
    #[error("Engine reported failure: {message}")]
    EngineFailure { message: String },

    /// A pending operation was cancelled before its completion arrived
    #[error("Operation cancelled")]
    Cancelled,

    /// The engine produced a payload this layer cannot decode. Treated as
    /// unrecoverable: this layer translates, it does not repair a
    /// misbehaving engine.
    #[error("Wire protocol violation: {message}")]
    Protocol { message: String },

    /// The engine client has already been disposed
    #[error("Engine client is disposed")]
    Disposed,

    /// Transport-level failure submitting a request
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Invalid state error
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    /// Create an invalid handle error
    pub fn invalid_handle(message: impl Into<String>) -> Self {
        Self::InvalidHandle {
            message: message.into(),
        }
    }

    /// Create an engine failure error from engine-reported error text
    pub fn engine_failure(message: impl Into<String>) -> Self {
        Self::EngineFailure {
            message: message.into(),
        }
    }

    /// Create a wire protocol violation error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<bincode::Error> for EngineError {
    fn from(err: bincode::Error) -> Self {
        Self::Protocol {
            message: err.to_string(),
        }
    }
}
