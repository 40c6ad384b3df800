//! Collaborator boundaries for deck reads and progress writes
//!
//! The product's persistence layer implements these traits. The in-memory
//! implementations exist so the engine can run and be tested standalone.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{EngineError, Result};

use super::models::{Deck, DeckRecord, Flashcard, UserDeckProgress, Visibility};

/// Read access to decks, their cards, and the reading user's progress.
pub trait DeckSource: Send + Sync {
    /// Fetch a deck visible to `user_id` together with cards and progress.
    /// Private decks are only visible to their owner.
    fn user_deck(&self, deck_id: Uuid, user_id: Uuid) -> Result<DeckRecord>;
}

/// Progress fields flushed by the end-of-session commit.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub user_id: Uuid,
    pub deck_id: Uuid,
    pub mastery: i32,
    pub completed_sessions: u32,
    pub last_studied: DateTime<Utc>,
}

/// Write access to per-user deck progress.
pub trait ProgressStore: Send + Sync {
    fn save_study_progress(&self, update: &ProgressUpdate) -> Result<()>;
    fn increment_challenge_completed(&self, user_id: Uuid, deck_id: Uuid) -> Result<()>;
}

/// In-memory deck source for tests and demos.
pub struct MemoryDecks {
    decks: Mutex<HashMap<Uuid, (Deck, Vec<Flashcard>)>>,
    progress: Mutex<HashMap<(Uuid, Uuid), UserDeckProgress>>,
}

impl MemoryDecks {
    pub fn new() -> Self {
        Self {
            decks: Mutex::new(HashMap::new()),
            progress: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert_deck(&self, deck: Deck, cards: Vec<Flashcard>) {
        self.decks.lock().unwrap().insert(deck.id, (deck, cards));
    }

    pub fn set_progress(&self, progress: UserDeckProgress) {
        self.progress
            .lock()
            .unwrap()
            .insert((progress.user_id, progress.deck_id), progress);
    }

    pub fn progress_for(&self, user_id: Uuid, deck_id: Uuid) -> Option<UserDeckProgress> {
        self.progress
            .lock()
            .unwrap()
            .get(&(user_id, deck_id))
            .cloned()
    }
}

impl Default for MemoryDecks {
    fn default() -> Self {
        Self::new()
    }
}

impl DeckSource for MemoryDecks {
    fn user_deck(&self, deck_id: Uuid, user_id: Uuid) -> Result<DeckRecord> {
        let decks = self.decks.lock().unwrap();
        let (deck, cards) = decks
            .get(&deck_id)
            .ok_or(EngineError::DeckNotFound(deck_id))?;

        if deck.visibility == Visibility::Private && deck.owner_id != user_id {
            return Err(EngineError::DeckNotFound(deck_id));
        }

        let progress = self
            .progress
            .lock()
            .unwrap()
            .get(&(user_id, deck_id))
            .cloned()
            .unwrap_or_else(|| UserDeckProgress::new(user_id, deck_id));

        Ok(DeckRecord {
            deck: deck.clone(),
            cards: cards.clone(),
            progress,
        })
    }
}

/// In-memory progress store. Session starts read progress from the deck
/// source, so fixtures that care about pre-existing progress seed the same
/// row into both stores.
pub struct MemoryProgress {
    rows: Mutex<HashMap<(Uuid, Uuid), UserDeckProgress>>,
    /// When set, every write fails — used to exercise commit-retry paths.
    failing: Mutex<bool>,
}

impl MemoryProgress {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            failing: Mutex::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    /// Insert a row directly, bypassing the commit surface (test setup).
    pub fn seed(&self, row: UserDeckProgress) {
        self.rows
            .lock()
            .unwrap()
            .insert((row.user_id, row.deck_id), row);
    }

    pub fn row(&self, user_id: Uuid, deck_id: Uuid) -> Option<UserDeckProgress> {
        self.rows.lock().unwrap().get(&(user_id, deck_id)).cloned()
    }

    fn check_available(&self) -> Result<()> {
        if *self.failing.lock().unwrap() {
            return Err(EngineError::PersistenceFailure(
                "progress store unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressStore for MemoryProgress {
    fn save_study_progress(&self, update: &ProgressUpdate) -> Result<()> {
        self.check_available()?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .entry((update.user_id, update.deck_id))
            .or_insert_with(|| UserDeckProgress::new(update.user_id, update.deck_id));
        row.mastery = update.mastery;
        row.completed_sessions = update.completed_sessions;
        row.last_studied = Some(update.last_studied);
        Ok(())
    }

    fn increment_challenge_completed(&self, user_id: Uuid, deck_id: Uuid) -> Result<()> {
        self.check_available()?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .entry((user_id, deck_id))
            .or_insert_with(|| UserDeckProgress::new(user_id, deck_id));
        row.challenge_completed += 1;
        Ok(())
    }
}
