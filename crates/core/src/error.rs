//! Error types for session orchestration

use crate::{credentials::ValidationError, gateway::GatewayError, transport::TransportError};

/// Errors a caller can observe from the orchestrator.
///
/// Each of these is also reported through the `on_error` callback and
/// reflected in the session's status message.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Transport failed to start: {0}")]
    TransportStart(#[source] TransportError),

    #[error("Microphone error: {0}")]
    Microphone(String),

    #[error("Transport error: {0}")]
    TransportRuntime(String),

    #[error("Transport command failed: {0}")]
    Transport(#[source] TransportError),

    #[error("Conversation mode can only be changed while idle")]
    ModeLocked,
}

pub type SessionResult<T> = Result<T, SessionError>;
