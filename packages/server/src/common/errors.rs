//! Error taxonomy for the orchestration core.
//!
//! Each collaborator seam has its own error so callers can tell a
//! validation failure (surface to the caller) from a bus outage (log and
//! carry on) without string matching.

use thiserror::Error;

use super::ConversationId;

/// Persistence failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("conversation {0} not found")]
    ConversationNotFound(ConversationId),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid stored row: {0}")]
    InvalidRow(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Event bus failures. Never fatal to the flow that published.
#[derive(Error, Debug)]
pub enum BusError {
    #[error("event bus unavailable: {0}")]
    Unavailable(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("event encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Decision policy failure. The scheduler treats it as an abstention.
#[derive(Error, Debug)]
#[error("decision failed: {0}")]
pub struct DecisionError(pub String);

/// Errors surfaced synchronously by the orchestration entry points.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("a debate needs at least two known participants, {resolved} resolved")]
    InsufficientParticipants { resolved: usize },

    #[error("message content must not be empty")]
    EmptyMessage,

    #[error("conversation title must not be empty")]
    EmptyTitle,

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl OrchestratorError {
    /// True for errors caused by the caller's input rather than the system.
    pub fn is_validation(&self) -> bool {
        !matches!(self, OrchestratorError::Persistence(_))
    }
}

/// Live bridge failures that happen before the stream starts.
#[derive(Error, Debug)]
pub enum LiveError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("subscribe failed: {0}")]
    Subscribe(#[from] BusError),
}

/// A live viewer's connection failed.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("transport i/o failed: {0}")]
    Io(String),

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}
