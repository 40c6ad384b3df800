//! Deck and progress data model
//!
//! Decks and flashcards are owned by the host application; the engine reads
//! them through the [`DeckSource`] boundary and writes per-user study
//! progress back through [`ProgressStore`].

pub mod models;
pub mod source;

pub use models::*;
pub use source::{DeckSource, MemoryDecks, MemoryProgress, ProgressStore, ProgressUpdate};
