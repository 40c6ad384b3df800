//! Generation gateway boundary
//!
//! The AI capability that turns a flashcard into a multiple-choice question
//! (or free-text notes into card drafts) lives outside this crate, behind
//! [`QuestionGenerator`]. Calls are fallible and possibly slow; the engine
//! fans them out concurrently, joins the results, and tolerates per-card
//! failures as long as at least one question materializes.

use async_trait::async_trait;
use futures_util::future::join_all;
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decks::Flashcard;
use crate::error::{EngineError, Result};

/// A generated 4-way multiple-choice question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    pub question: String,
    pub correct_answer: String,
    pub options: [String; 4],
    pub source_card_id: Uuid,
}

/// A flashcard draft extracted from notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteCard {
    pub question: String,
    pub answer: String,
}

/// External AI generation capability. The engine never retries these calls
/// itself; a failed card is simply dropped from the quiz.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate_question(&self, card: &Flashcard) -> Result<GeneratedQuestion>;

    async fn generate_flashcards_from_notes(&self, notes: &str) -> Result<Vec<NoteCard>>;
}

/// Generate one question per card, concurrently with no ordering guarantee
/// among the calls, then join. Partial failure keeps the survivors; when
/// every card fails the whole materialization fails.
pub async fn materialize_questions(
    generator: &dyn QuestionGenerator,
    cards: &[Flashcard],
) -> Result<Vec<GeneratedQuestion>> {
    if cards.is_empty() {
        return Err(EngineError::GenerationFailure(
            "no cards to generate from".to_string(),
        ));
    }

    let results = join_all(cards.iter().map(|card| generator.generate_question(card))).await;

    let mut questions = Vec::with_capacity(cards.len());
    let mut failures = 0usize;
    for (card, result) in cards.iter().zip(results) {
        match result {
            Ok(question) => questions.push(question),
            Err(err) => {
                warn!("question generation failed for card {}: {}", card.id, err);
                failures += 1;
            }
        }
    }

    if questions.is_empty() {
        return Err(EngineError::GenerationFailure(format!(
            "all {} generation calls failed",
            failures
        )));
    }
    Ok(questions)
}
