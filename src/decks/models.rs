//! Data models for decks, flashcards, and per-user progress

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who can see and study a deck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    Public,
    Private,
}

impl Default for Visibility {
    fn default() -> Self {
        Self::Private
    }
}

/// A deck is an ordered collection of flashcards owned by one user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub rating: f32,
    #[serde(default)]
    pub study_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deck {
    pub fn new(owner_id: Uuid, title: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            title,
            visibility: Visibility::default(),
            rating: 0.0,
            study_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A flashcard: a term and its definition, optionally with a term image
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    pub id: Uuid,
    pub deck_id: Uuid,
    pub term: String,
    pub definition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_image: Option<String>,
    #[serde(default)]
    pub position: i32,
}

impl Flashcard {
    pub fn new(deck_id: Uuid, term: String, definition: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            deck_id,
            term,
            definition,
            term_image: None,
            position: 0,
        }
    }
}

/// Per-(user, deck) study progress, mutated only by the end-of-session commit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDeckProgress {
    pub user_id: Uuid,
    pub deck_id: Uuid,
    /// Clamped to 0..=100
    #[serde(default)]
    pub mastery: i32,
    #[serde(default)]
    pub completed_sessions: u32,
    /// Gates quiz-mode eligibility
    #[serde(default)]
    pub challenge_completed: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_studied: Option<DateTime<Utc>>,
}

impl UserDeckProgress {
    pub fn new(user_id: Uuid, deck_id: Uuid) -> Self {
        Self {
            user_id,
            deck_id,
            mastery: 0,
            completed_sessions: 0,
            challenge_completed: 0,
            last_studied: None,
        }
    }
}

/// A deck read together with its cards and the reader's progress
#[derive(Debug, Clone)]
pub struct DeckRecord {
    pub deck: Deck,
    pub cards: Vec<Flashcard>,
    pub progress: UserDeckProgress,
}
