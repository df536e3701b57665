//! Error types for Whodunit

use thiserror::Error;

/// Hard failures only. Gameplay mistakes (wrong accusation, empty search,
/// missing item) are narrated, never returned as errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed world state: {0}")]
    MalformedWorldState(String),

    #[error("unknown participant: {0}")]
    UnknownParticipant(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedWorldState(reason.into())
    }

    pub fn unknown_participant(id: impl std::fmt::Display) -> Self {
        Self::UnknownParticipant(id.to_string())
    }
}
