//! Engine-wide error taxonomy
//!
//! Every fallible engine operation returns `EngineError`. Failures that
//! reach a caller are rendered through [`OpStatus`], which deliberately
//! collapses token failures into one message so a caller cannot probe
//! whether a token was expired, already used, or owned by someone else.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("You must be signed in with a verified email to do that")]
    Unauthorized,

    #[error("Not eligible: {0}")]
    NotEligible(String),

    #[error("Not enough energy to generate a quiz")]
    InsufficientCredits,

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("Question generation failed: {0}")]
    GenerationFailure(String),

    #[error("Could not save study progress: {0}")]
    PersistenceFailure(String),

    #[error("Deck not found: {0}")]
    DeckNotFound(Uuid),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Invalid session action: {0}")]
    InvalidAction(String),

    #[error("Invalid flashcard reference")]
    InvalidCard,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// User-visible failure shape: `{ success, message }`. Successful calls
/// return their payload directly; this is how an error crosses to the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpStatus {
    pub success: bool,
    pub message: String,
}

impl From<&EngineError> for OpStatus {
    fn from(err: &EngineError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_share_one_message() {
        // The caller must not be able to tell why a token was rejected.
        let msg = EngineError::InvalidOrExpiredToken.to_string();
        assert_eq!(msg, "Invalid or expired token");
        assert!(!msg.contains("used"));
        assert!(!msg.contains("owner"));
    }

    #[test]
    fn op_status_from_error() {
        let status = OpStatus::from(&EngineError::InsufficientCredits);
        assert!(!status.success);
        assert!(!status.message.is_empty());
    }
}
