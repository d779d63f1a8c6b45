//! Error types for the room domain layer

use thiserror::Error;

use roomlink_engine_core::EngineError;

/// Result type for room operations
pub type RoomResult<T> = Result<T, RoomError>;

/// Errors that can occur in the room domain layer
#[derive(Debug, Error)]
pub enum RoomError {
    /// Engine boundary error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Operation requires a connected room
    #[error("Room is not connected")]
    NotConnected,

    /// Operation attempted on an object of the wrong origin, e.g.
    /// subscribing to a local publication. Rejected locally, never sent
    /// to the engine.
    #[error("Wrong origin for {operation}: requires {required}")]
    WrongOrigin {
        operation: &'static str,
        required: &'static str,
    },

    /// No participant with the given identity is known to this room
    #[error("Participant not found: {identity}")]
    ParticipantNotFound { identity: String },

    /// No publication with the given sid is known to the participant
    #[error("Track publication not found: {sid}")]
    PublicationNotFound { sid: String },

    /// Invalid state error
    #[error("Invalid state: {message}")]
    InvalidState { message: String },
}

impl RoomError {
    /// Create a wrong-origin error
    pub fn wrong_origin(operation: &'static str, required: &'static str) -> Self {
        Self::WrongOrigin {
            operation,
            required,
        }
    }

    /// Create a participant-not-found error
    pub fn participant_not_found(identity: impl Into<String>) -> Self {
        Self::ParticipantNotFound {
            identity: identity.into(),
        }
    }

    /// Create a publication-not-found error
    pub fn publication_not_found(sid: impl Into<String>) -> Self {
        Self::PublicationNotFound { sid: sid.into() }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }
}
