use shared::{
    domain::{EventId, GameId},
    error::{ApiError, ErrorCode},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("game '{0}' was not found")]
    NotFound(GameId),
    #[error("the unsaved game cannot be deleted")]
    ProtectedDraft,
    #[error("event '{0}' is not part of the current game")]
    EventNotFound(EventId),
    #[error("storage rejected {operation} for game '{game_id}'")]
    Rejected {
        operation: &'static str,
        game_id: GameId,
    },
    #[error("storage failure during {operation}: {source}")]
    Storage {
        operation: &'static str,
        source: anyhow::Error,
    },
}

impl PersistenceError {
    pub fn storage(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Storage { operation, source }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::ProtectedDraft => ErrorCode::Protected,
            Self::EventNotFound(_) => ErrorCode::Validation,
            Self::Rejected { .. } | Self::Storage { .. } => ErrorCode::StorageFailure,
        }
    }
}

impl From<&PersistenceError> for ApiError {
    fn from(value: &PersistenceError) -> Self {
        ApiError::new(value.code(), value.to_string())
    }
}
