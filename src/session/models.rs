//! Data models for study sessions

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decks::Flashcard;
use crate::mastery;

/// How a deck is being studied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StudyMode {
    /// Free review: flip through cards, no right/wrong signal
    Flip,
    /// Timed multiple-choice rounds built from the deck itself
    Challenge,
    /// AI-generated adaptive quiz, gated by an access token
    Quiz,
}

/// Session lifecycle. `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    Initializing,
    InProgress,
    RoundComplete,
    Saving,
    Ended,
}

/// Challenge round configuration. Fewer, harder rounds carry fewer
/// questions each; the totals differ by design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoundCount {
    One,
    Three,
    Five,
}

impl RoundCount {
    pub fn rounds(&self) -> u32 {
        match self {
            RoundCount::One => 1,
            RoundCount::Three => 3,
            RoundCount::Five => 5,
        }
    }

    pub fn questions_per_round(&self) -> usize {
        match self {
            RoundCount::One => 10,
            RoundCount::Three => 8,
            RoundCount::Five => 5,
        }
    }
}

/// One 4-way multiple-choice question shown during Challenge or Quiz play.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuestion {
    pub card_id: Uuid,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

/// An in-flight study session. Ephemeral: lives in the engine's session
/// table from `start` until the end-of-session commit, never persisted.
#[derive(Debug, Clone)]
pub struct StudySession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub deck_id: Uuid,
    pub mode: StudyMode,
    pub state: SessionState,

    /// Full deck, kept so Challenge can sample fresh rounds
    pub deck_cards: Vec<Flashcard>,
    /// Shuffled index permutation over `deck_cards` (Flip mode)
    pub order: Vec<usize>,
    /// Questions of the current round (Challenge) or the whole quiz
    pub questions: Vec<SessionQuestion>,

    pub position: usize,
    pub is_flipped: bool,

    pub round: u32,
    pub total_rounds: u32,
    pub questions_per_round: usize,
    pub is_timed: bool,
    /// Whether every configured round was finished (gates the
    /// challenge-completed increment at commit time)
    pub completed_all_rounds: bool,

    pub round_correct: u32,
    pub round_incorrect: u32,
    pub correct: u32,
    pub incorrect: u32,

    /// Progress as read at session start
    pub previous_mastery: i32,
    pub previous_completed_sessions: u32,
}

impl StudySession {
    /// Mastery as it would stand if the session committed right now.
    pub fn mastery_in_progress(&self) -> i32 {
        match self.mode {
            StudyMode::Flip => self.previous_mastery,
            StudyMode::Challenge | StudyMode::Quiz => mastery::clamp_mastery(
                self.previous_mastery + self.correct as i32 - self.incorrect as i32,
            ),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            mode: self.mode,
            state: self.state,
            position: self.position,
            round: self.round,
            total_rounds: self.total_rounds,
            cards_in_round: match self.mode {
                StudyMode::Flip => self.order.len(),
                _ => self.questions.len(),
            },
            round_correct: self.round_correct,
            round_incorrect: self.round_incorrect,
            correct: self.correct,
            incorrect: self.incorrect,
            mastery_in_progress: self.mastery_in_progress(),
            ended: self.state == SessionState::Ended,
        }
    }
}

/// Caller-facing view of a session after each operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub mode: StudyMode,
    pub state: SessionState,
    pub position: usize,
    pub round: u32,
    pub total_rounds: u32,
    pub cards_in_round: usize,
    pub round_correct: u32,
    pub round_incorrect: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub mastery_in_progress: i32,
    pub ended: bool,
}

/// Result of a committed session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOutcome {
    pub session_id: Uuid,
    pub mode: StudyMode,
    pub mastery: i32,
    pub correct: u32,
    pub incorrect: u32,
    pub completed_sessions: u32,
}
