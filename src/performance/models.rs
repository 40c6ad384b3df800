//! Data models for card performance tracking

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decks::Flashcard;

/// Correct/incorrect answer counters for one card, scoped to one user.
/// Counters only ever increment; missing fields deserialize to zero so
/// stored data with absent counters is treated as unseen, not rejected.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardCounters {
    #[serde(default)]
    pub num_correct: u32,
    #[serde(default)]
    pub num_incorrect: u32,
}

impl CardCounters {
    pub fn attempts(&self) -> u32 {
        self.num_correct + self.num_incorrect
    }
}

/// One entry of a batched answer recording.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub flashcard_id: Uuid,
    pub is_correct: bool,
}

/// Partial-success summary of a batched recording: a malformed entry is
/// counted as failed without blocking the rest of the batch.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub applied: u32,
    pub failed: u32,
}

/// A flashcard joined with the studying user's counters, as consumed by
/// the adaptive selector.
#[derive(Debug, Clone)]
pub struct CardWithPerformance {
    pub card: Flashcard,
    pub counters: CardCounters,
}

impl CardWithPerformance {
    /// Incorrect-to-correct ratio used to rank cards for selection.
    /// A never-correct card with misses ranks highest.
    pub fn struggle_ratio(&self) -> f64 {
        self.counters.num_incorrect as f64 / self.counters.num_correct.max(1) as f64
    }
}
