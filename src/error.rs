use thiserror::Error;

use crate::exercise::ExerciseType;

/// Errors surfaced by session operations.
///
/// Infrastructure failures (database, saver, analytics) never show up here;
/// they are logged by the collaborator that hit them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid exercise config: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error("exercise data type mismatch: session holds {expected}, got {actual}")]
    TypeMismatch {
        expected: ExerciseType,
        actual: ExerciseType,
    },

    #[error("invalid exercise data: {0}")]
    InvalidExerciseData(String),

    #[error("session cannot complete from stage {stage}; advance to the final stage first")]
    PrematureCompletion { stage: crate::config::Stage },

    #[error("session {session_id} has already ended")]
    SessionEnded { session_id: String },
}

impl EngineError {
    /// Errors the caller can recover from by re-prompting or advancing.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_) | EngineError::PrematureCompletion { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
