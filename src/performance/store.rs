//! Storage for per-user card performance counters
//!
//! Layout under the store directory:
//! ```text
//! performance/
//! └── {user-id}.json   # map of card id -> counters
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use log::warn;
use uuid::Uuid;

use crate::decks::Flashcard;
use crate::error::{EngineError, Result};

use super::models::{AnswerRecord, BatchOutcome, CardCounters, CardWithPerformance};

/// File-backed store of answer counters, one JSON file per user.
pub struct PerformanceStore {
    performance_dir: PathBuf,
}

impl PerformanceStore {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        let performance_dir = data_dir.join("performance");
        fs::create_dir_all(&performance_dir)?;
        Ok(Self { performance_dir })
    }

    fn user_path(&self, user_id: Uuid) -> PathBuf {
        self.performance_dir.join(format!("{}.json", user_id))
    }

    fn load_user(&self, user_id: Uuid) -> Result<HashMap<Uuid, CardCounters>> {
        let path = self.user_path(user_id);
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&path)?;
        let counters: HashMap<Uuid, CardCounters> = serde_json::from_str(&content)?;
        Ok(counters)
    }

    fn save_user(&self, user_id: Uuid, counters: &HashMap<Uuid, CardCounters>) -> Result<()> {
        let json = serde_json::to_string_pretty(counters)?;
        fs::write(self.user_path(user_id), json)?;
        Ok(())
    }

    /// Counters for one card, zero if the user has never answered it.
    pub fn counters(&self, user_id: Uuid, flashcard_id: Uuid) -> Result<CardCounters> {
        let counters = self.load_user(user_id)?;
        Ok(counters.get(&flashcard_id).copied().unwrap_or_default())
    }

    /// Record one answer event. Not idempotent: every call adds one event,
    /// so callers must invoke it exactly once per user answer.
    pub fn record_answer(&self, user_id: Uuid, flashcard_id: Uuid, is_correct: bool) -> Result<()> {
        if flashcard_id.is_nil() {
            return Err(EngineError::InvalidCard);
        }

        let mut counters = self.load_user(user_id)?;
        let entry = counters.entry(flashcard_id).or_default();
        if is_correct {
            entry.num_correct += 1;
        } else {
            entry.num_incorrect += 1;
        }
        self.save_user(user_id, &counters)
    }

    /// Apply an ordered batch of answer records independently. A malformed
    /// entry is counted as failed and the rest of the batch still applies.
    pub fn record_batch(&self, user_id: Uuid, batch: &[AnswerRecord]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for record in batch {
            match self.record_answer(user_id, record.flashcard_id, record.is_correct) {
                Ok(()) => outcome.applied += 1,
                Err(err) => {
                    warn!(
                        "skipping answer record for card {}: {}",
                        record.flashcard_id, err
                    );
                    outcome.failed += 1;
                }
            }
        }
        Ok(outcome)
    }

    /// Join a deck's cards with the user's counters for adaptive selection.
    pub fn deck_performance(
        &self,
        user_id: Uuid,
        cards: &[Flashcard],
    ) -> Result<Vec<CardWithPerformance>> {
        let counters = self.load_user(user_id)?;
        Ok(cards
            .iter()
            .map(|card| CardWithPerformance {
                card: card.clone(),
                counters: counters.get(&card.id).copied().unwrap_or_default(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, PerformanceStore) {
        let dir = TempDir::new().unwrap();
        let store = PerformanceStore::new(dir.path().to_path_buf()).unwrap();
        (dir, store)
    }

    #[test]
    fn records_one_event_per_call() {
        let (_dir, store) = store();
        let user = Uuid::new_v4();
        let card = Uuid::new_v4();

        store.record_answer(user, card, true).unwrap();
        store.record_answer(user, card, true).unwrap();
        store.record_answer(user, card, false).unwrap();

        let counters = store.counters(user, card).unwrap();
        assert_eq!(counters.num_correct, 2);
        assert_eq!(counters.num_incorrect, 1);
        assert_eq!(counters.attempts(), 3);
    }

    #[test]
    fn counters_are_scoped_per_user() {
        let (_dir, store) = store();
        let card = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        store.record_answer(alice, card, false).unwrap();

        assert_eq!(store.counters(alice, card).unwrap().num_incorrect, 1);
        assert_eq!(store.counters(bob, card).unwrap().attempts(), 0);
    }

    #[test]
    fn batch_reports_partial_success() {
        let (_dir, store) = store();
        let user = Uuid::new_v4();
        let good = Uuid::new_v4();

        let batch = vec![
            AnswerRecord {
                flashcard_id: good,
                is_correct: true,
            },
            AnswerRecord {
                flashcard_id: Uuid::nil(),
                is_correct: false,
            },
            AnswerRecord {
                flashcard_id: good,
                is_correct: false,
            },
        ];

        let outcome = store.record_batch(user, &batch).unwrap();
        assert_eq!(outcome.applied, 2);
        assert_eq!(outcome.failed, 1);

        let counters = store.counters(user, good).unwrap();
        assert_eq!(counters.num_correct, 1);
        assert_eq!(counters.num_incorrect, 1);
    }

    #[test]
    fn unseen_cards_default_to_zero() {
        let (_dir, store) = store();
        let user = Uuid::new_v4();
        let deck = Uuid::new_v4();
        let cards = vec![
            Flashcard::new(deck, "a".to_string(), "1".to_string()),
            Flashcard::new(deck, "b".to_string(), "2".to_string()),
        ];

        let perf = store.deck_performance(user, &cards).unwrap();
        assert_eq!(perf.len(), 2);
        assert!(perf.iter().all(|p| p.counters.attempts() == 0));
    }
}
