use thiserror::Error;

use crate::dao::StoreError;
use crate::livekit::ConferencingError;

#[derive(Debug, Error)]
pub enum MeetingError {
    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    #[error("Meeting not ready yet")]
    RoomNotReady,
    #[error("Meeting locked: {0}")]
    Locked(String),
    #[error("Conferencing service unavailable: {0}")]
    ExternalServiceUnavailable(String),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("Malformed event: {0}")]
    MalformedEvent(String),
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Too many concurrent updates to session {0}")]
    Contention(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ConferencingError> for MeetingError {
    fn from(e: ConferencingError) -> Self {
        Self::ExternalServiceUnavailable(e.to_string())
    }
}

pub type MeetingResult<T> = Result<T, MeetingError>;
