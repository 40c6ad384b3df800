//! Session state machine and engine aggregate
//!
//! `StudyEngine` owns every in-flight session, keyed by session id, and
//! wires the mode-specific state machines to the performance store, the
//! mastery ledger, the adaptive selector, and the token/credit protocol.
//! Sessions are passed through explicitly; there is no global state.
//!
//! Lifecycle per session:
//! `Idle → Initializing → InProgress → (RoundComplete ↔ InProgress)* →
//! Saving → Ended`, with `Ended` terminal. A session that fails its
//! end-of-session commit stays in `Saving` so the commit can be retried
//! without replaying the answers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::auth::{require_verified_user, User, UserDirectory};
use crate::credits::CreditLedger;
use crate::decks::{DeckRecord, DeckSource, Flashcard, ProgressStore, ProgressUpdate};
use crate::error::{EngineError, Result};
use crate::generation::{materialize_questions, NoteCard, QuestionGenerator};
use crate::mastery;
use crate::performance::{AnswerRecord, BatchOutcome, PerformanceStore};
use crate::selector;
use crate::tokens::{IssuedToken, TokenBroker};

use super::models::{
    RoundCount, SessionOutcome, SessionQuestion, SessionSnapshot, SessionState, StudyMode,
    StudySession,
};
use super::timer::TimeoutEvent;

/// Challenge needs enough cards to build 4-way options
const MIN_CHALLENGE_CARDS: usize = 4;
/// Quiz eligibility floor: deck size
const MIN_QUIZ_CARDS: usize = 10;
/// Quiz eligibility floor: mastery
const MIN_QUIZ_MASTERY: i32 = 10;
/// Quiz eligibility floor: completed challenge sessions
const MIN_QUIZ_CHALLENGES: u32 = 3;

/// The study session and adaptive generation engine.
pub struct StudyEngine {
    users: Arc<dyn UserDirectory>,
    decks: Arc<dyn DeckSource>,
    progress: Arc<dyn ProgressStore>,
    generator: Arc<dyn QuestionGenerator>,
    performance: PerformanceStore,
    credits: CreditLedger,
    tokens: TokenBroker,
    sessions: Mutex<HashMap<Uuid, StudySession>>,
    rng: Mutex<StdRng>,
}

impl StudyEngine {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        decks: Arc<dyn DeckSource>,
        progress: Arc<dyn ProgressStore>,
        generator: Arc<dyn QuestionGenerator>,
        data_dir: PathBuf,
    ) -> Result<Self> {
        Ok(Self {
            users,
            decks,
            progress,
            generator,
            performance: PerformanceStore::new(data_dir)?,
            credits: CreditLedger::new(),
            tokens: TokenBroker::new(),
            sessions: Mutex::new(HashMap::new()),
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    /// Replace the random source with a seeded one (tests).
    pub fn with_rng_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn credits(&self) -> &CreditLedger {
        &self.credits
    }

    pub fn performance(&self) -> &PerformanceStore {
        &self.performance
    }

    // ==================== Session start ====================

    /// Start a free-review Flip session over the whole deck.
    pub fn start_flip(&self, deck_id: Uuid) -> Result<SessionSnapshot> {
        let user = require_verified_user(self.users.as_ref())?;
        let record = self.decks.user_deck(deck_id, user.id)?;
        if record.cards.is_empty() {
            return Err(EngineError::NotEligible(
                "This deck has no cards to study".to_string(),
            ));
        }

        let mut session = self.new_session(&user, &record, StudyMode::Flip);
        let mut order: Vec<usize> = (0..record.cards.len()).collect();
        order.shuffle(&mut *self.rng.lock().unwrap());
        session.order = order;

        Ok(self.admit(session))
    }

    /// Start a Challenge session with the configured round count.
    pub fn start_challenge(
        &self,
        deck_id: Uuid,
        rounds: RoundCount,
        timed: bool,
    ) -> Result<SessionSnapshot> {
        let user = require_verified_user(self.users.as_ref())?;
        let record = self.decks.user_deck(deck_id, user.id)?;
        if record.cards.len() < MIN_CHALLENGE_CARDS {
            return Err(EngineError::NotEligible(format!(
                "Challenge mode needs at least {} cards",
                MIN_CHALLENGE_CARDS
            )));
        }

        let mut session = self.new_session(&user, &record, StudyMode::Challenge);
        session.total_rounds = rounds.rounds();
        session.questions_per_round = rounds.questions_per_round();
        session.is_timed = timed;
        session.round = 1;
        session.questions = {
            let mut rng = self.rng.lock().unwrap();
            build_round(&record.cards, session.questions_per_round, &mut *rng)
        };

        Ok(self.admit(session))
    }

    /// Start a Quiz session. The token must be valid and unredeemed; it is
    /// consumed here, before any generation call, and is not refunded if
    /// generation fails entirely.
    pub async fn start_quiz(&self, deck_id: Uuid, token: &str) -> Result<SessionSnapshot> {
        let user = require_verified_user(self.users.as_ref())?;
        let record = self.decks.user_deck(deck_id, user.id)?;

        let num_questions = self.tokens.redeem(token, user.id, deck_id)?;

        let performance = self.performance.deck_performance(user.id, &record.cards)?;
        let picked = {
            let mut rng = self.rng.lock().unwrap();
            selector::select(&performance, num_questions as usize, &mut *rng)
        };
        let cards: Vec<Flashcard> = picked.into_iter().map(|p| p.card).collect();

        let generated = materialize_questions(self.generator.as_ref(), &cards).await?;
        info!(
            "materialized {}/{} quiz questions for deck {}",
            generated.len(),
            cards.len(),
            deck_id
        );

        let mut session = self.new_session(&user, &record, StudyMode::Quiz);
        session.total_rounds = 1;
        session.round = 1;
        session.questions = generated
            .into_iter()
            .map(|q| SessionQuestion {
                card_id: q.source_card_id,
                prompt: q.question,
                options: q.options.to_vec(),
                correct_answer: q.correct_answer,
            })
            .collect();

        Ok(self.admit(session))
    }

    fn new_session(&self, user: &User, record: &DeckRecord, mode: StudyMode) -> StudySession {
        // Idle and Initializing are passed through while the working set
        // is assembled; the session becomes visible in InProgress.
        let session = StudySession {
            id: Uuid::new_v4(),
            user_id: user.id,
            deck_id: record.deck.id,
            mode,
            state: SessionState::Initializing,
            deck_cards: record.cards.clone(),
            order: Vec::new(),
            questions: Vec::new(),
            position: 0,
            is_flipped: false,
            round: 0,
            total_rounds: 0,
            questions_per_round: 0,
            is_timed: false,
            completed_all_rounds: false,
            round_correct: 0,
            round_incorrect: 0,
            correct: 0,
            incorrect: 0,
            previous_mastery: record.progress.mastery,
            previous_completed_sessions: record.progress.completed_sessions,
        };
        debug!("session {} initializing ({:?})", session.id, mode);
        session
    }

    fn admit(&self, mut session: StudySession) -> SessionSnapshot {
        session.state = SessionState::InProgress;
        info!(
            "session {} in progress: {:?} over deck {}",
            session.id, session.mode, session.deck_id
        );
        let snapshot = session.snapshot();
        self.sessions.lock().unwrap().insert(session.id, session);
        snapshot
    }

    // ==================== Answering ====================

    /// Record the user's answer to the current question and advance.
    pub fn answer(&self, session_id: Uuid, is_correct: bool) -> Result<SessionSnapshot> {
        let user = require_verified_user(self.users.as_ref())?;
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(&session_id)
            .ok_or(EngineError::SessionNotFound(session_id))?;
        if session.user_id != user.id {
            return Err(EngineError::Unauthorized);
        }
        self.apply_answer(session, is_correct)?;
        Ok(session.snapshot())
    }

    fn apply_answer(&self, session: &mut StudySession, is_correct: bool) -> Result<()> {
        if session.mode == StudyMode::Flip {
            return Err(EngineError::InvalidAction(
                "Flip sessions have no answers to record".to_string(),
            ));
        }
        if session.state != SessionState::InProgress {
            return Err(EngineError::InvalidAction(
                "Session is not accepting answers".to_string(),
            ));
        }

        let question = session
            .questions
            .get(session.position)
            .ok_or_else(|| EngineError::InvalidAction("No current question".to_string()))?;
        self.performance
            .record_answer(session.user_id, question.card_id, is_correct)?;

        if is_correct {
            session.correct += 1;
            session.round_correct += 1;
        } else {
            session.incorrect += 1;
            session.round_incorrect += 1;
        }

        if session.position + 1 < session.questions.len() {
            session.position += 1;
            return Ok(());
        }

        // Last question of the round.
        if session.mode == StudyMode::Challenge && session.round < session.total_rounds {
            session.state = SessionState::RoundComplete;
            debug!(
                "session {} round {}/{} complete",
                session.id, session.round, session.total_rounds
            );
        } else {
            session.completed_all_rounds = true;
            session.state = SessionState::Saving;
            debug!("session {} ready to save", session.id);
        }
        Ok(())
    }

    /// Process a countdown expiry. A stale event (session gone, not timed,
    /// or armed for a position the session has already left) is discarded.
    pub fn handle_timeout(&self, event: TimeoutEvent) -> Option<SessionSnapshot> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(&event.session_id)?;
        if !session.is_timed
            || session.state != SessionState::InProgress
            || session.position != event.position
        {
            debug!("discarding stale timeout for session {}", event.session_id);
            return None;
        }

        // Timing out counts as an incorrect answer and auto-advances.
        match self.apply_answer(session, false) {
            Ok(()) => Some(session.snapshot()),
            Err(err) => {
                warn!("could not record timeout answer: {}", err);
                None
            }
        }
    }

    /// Advance a Challenge session from `RoundComplete` into its next
    /// round. Per-round tallies reset; cumulative tallies persist.
    pub fn advance_round(&self, session_id: Uuid) -> Result<SessionSnapshot> {
        let user = require_verified_user(self.users.as_ref())?;
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(&session_id)
            .ok_or(EngineError::SessionNotFound(session_id))?;
        if session.user_id != user.id {
            return Err(EngineError::Unauthorized);
        }
        if session.state != SessionState::RoundComplete {
            return Err(EngineError::InvalidAction(
                "No completed round to advance from".to_string(),
            ));
        }

        session.round += 1;
        session.position = 0;
        session.round_correct = 0;
        session.round_incorrect = 0;
        session.questions = {
            let mut rng = self.rng.lock().unwrap();
            build_round(&session.deck_cards, session.questions_per_round, &mut *rng)
        };
        session.state = SessionState::InProgress;
        debug!(
            "session {} advanced to round {}/{}",
            session.id, session.round, session.total_rounds
        );
        Ok(session.snapshot())
    }

    // ==================== Flip controls ====================

    /// Toggle the current card face. Not a state transition.
    pub fn flip(&self, session_id: Uuid) -> Result<SessionSnapshot> {
        self.with_flip_session(session_id, |session| {
            session.is_flipped = !session.is_flipped;
            Ok(())
        })
    }

    /// Move to the next card, wrapping past the end.
    pub fn next_card(&self, session_id: Uuid) -> Result<SessionSnapshot> {
        self.with_flip_session(session_id, |session| {
            session.position = (session.position + 1) % session.order.len();
            session.is_flipped = false;
            Ok(())
        })
    }

    /// Move to the previous card, wrapping past the start.
    pub fn prev_card(&self, session_id: Uuid) -> Result<SessionSnapshot> {
        self.with_flip_session(session_id, |session| {
            let len = session.order.len();
            session.position = (session.position + len - 1) % len;
            session.is_flipped = false;
            Ok(())
        })
    }

    /// Re-shuffle the working set in place and return to the first card.
    pub fn shuffle(&self, session_id: Uuid) -> Result<SessionSnapshot> {
        self.with_flip_session(session_id, |session| {
            let mut rng = self.rng.lock().unwrap();
            session.order.shuffle(&mut *rng);
            session.position = 0;
            session.is_flipped = false;
            Ok(())
        })
    }

    fn with_flip_session(
        &self,
        session_id: Uuid,
        f: impl FnOnce(&mut StudySession) -> Result<()>,
    ) -> Result<SessionSnapshot> {
        let user = require_verified_user(self.users.as_ref())?;
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(&session_id)
            .ok_or(EngineError::SessionNotFound(session_id))?;
        if session.user_id != user.id {
            return Err(EngineError::Unauthorized);
        }
        if session.mode != StudyMode::Flip {
            return Err(EngineError::InvalidAction(
                "Only Flip sessions support card navigation".to_string(),
            ));
        }
        if session.state != SessionState::InProgress {
            return Err(EngineError::InvalidAction(
                "Session is not in progress".to_string(),
            ));
        }
        f(session)?;
        Ok(session.snapshot())
    }

    // ==================== Ending ====================

    /// Commit a session: fold the tallies through the mastery ledger,
    /// flush progress, and (for a fully-played Challenge) bump the
    /// challenge-completed counter. On persistence failure the session is
    /// kept in `Saving`; calling `end` again retries the same commit.
    pub fn end(&self, session_id: Uuid, studied_secs: u64) -> Result<SessionOutcome> {
        let user = require_verified_user(self.users.as_ref())?;
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(&session_id)
            .ok_or(EngineError::SessionNotFound(session_id))?;
        if session.user_id != user.id {
            return Err(EngineError::Unauthorized);
        }
        if session.state == SessionState::Ended {
            return Err(EngineError::InvalidAction(
                "Session has already ended".to_string(),
            ));
        }

        session.state = SessionState::Saving;
        let new_mastery = mastery::session_mastery(
            session.previous_mastery,
            session.correct,
            session.incorrect,
            session.mode,
            studied_secs,
        );
        let completed_sessions = session.previous_completed_sessions + 1;

        let update = ProgressUpdate {
            user_id: session.user_id,
            deck_id: session.deck_id,
            mastery: new_mastery,
            completed_sessions,
            last_studied: Utc::now(),
        };
        // In-memory results survive a failed commit; the caller can retry
        // end() with the same session id.
        self.progress.save_study_progress(&update)?;
        if session.mode == StudyMode::Challenge && session.completed_all_rounds {
            self.progress
                .increment_challenge_completed(session.user_id, session.deck_id)?;
        }

        session.state = SessionState::Ended;
        info!(
            "session {} ended: mastery {} -> {} ({}/{} correct)",
            session.id,
            session.previous_mastery,
            new_mastery,
            session.correct,
            session.correct + session.incorrect
        );

        let outcome = SessionOutcome {
            session_id: session.id,
            mode: session.mode,
            mastery: new_mastery,
            correct: session.correct,
            incorrect: session.incorrect,
            completed_sessions,
        };
        sessions.remove(&session_id);
        Ok(outcome)
    }

    /// Current view of a session.
    pub fn snapshot(&self, session_id: Uuid) -> Result<SessionSnapshot> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(&session_id)
            .map(|s| s.snapshot())
            .ok_or(EngineError::SessionNotFound(session_id))
    }

    // ==================== Tokens ====================

    /// Issue a quiz access token for a deck the user is eligible to quiz
    /// on. Charges one credit up front, whether or not the token is ever
    /// redeemed.
    pub fn issue_quiz_token(&self, deck_id: Uuid, num_questions: u32) -> Result<IssuedToken> {
        let user = require_verified_user(self.users.as_ref())?;
        let record = self.decks.user_deck(deck_id, user.id)?;

        if record.cards.len() < MIN_QUIZ_CARDS {
            return Err(EngineError::NotEligible(format!(
                "Quiz mode needs a deck with at least {} cards",
                MIN_QUIZ_CARDS
            )));
        }
        if record.progress.mastery < MIN_QUIZ_MASTERY {
            return Err(EngineError::NotEligible(format!(
                "Reach {}% mastery before taking a quiz",
                MIN_QUIZ_MASTERY
            )));
        }
        if record.progress.challenge_completed < MIN_QUIZ_CHALLENGES {
            return Err(EngineError::NotEligible(format!(
                "Complete {} challenges before taking a quiz",
                MIN_QUIZ_CHALLENGES
            )));
        }

        self.tokens.issue(&self.credits, user.id, deck_id, num_questions)
    }

    /// Redeem a quiz token directly (the token API surface); `start_quiz`
    /// performs the same redemption internally.
    pub fn redeem_quiz_token(&self, deck_id: Uuid, token: &str) -> Result<u32> {
        let user = require_verified_user(self.users.as_ref())?;
        self.tokens.redeem(token, user.id, deck_id)
    }

    // ==================== Answer recording ====================

    /// Batched answer recording with a partial-success summary.
    pub fn record_answers(&self, batch: &[AnswerRecord]) -> Result<BatchOutcome> {
        let user = require_verified_user(self.users.as_ref())?;
        self.performance.record_batch(user.id, batch)
    }

    // ==================== Notes import ====================

    /// Turn free-text notes into flashcard drafts via the gateway.
    pub async fn generate_cards_from_notes(&self, notes: &str) -> Result<Vec<NoteCard>> {
        require_verified_user(self.users.as_ref())?;
        self.generator.generate_flashcards_from_notes(notes).await
    }
}

/// Sample a round's questions: `questions_per_round` cards without
/// replacement, each with 3 distractor terms from other cards plus the
/// correct term, option order shuffled.
fn build_round<R: Rng>(
    cards: &[Flashcard],
    questions_per_round: usize,
    rng: &mut R,
) -> Vec<SessionQuestion> {
    let picked: Vec<&Flashcard> = cards
        .choose_multiple(rng, questions_per_round.min(cards.len()))
        .collect();

    picked
        .iter()
        .map(|card| {
            let others: Vec<&str> = cards
                .iter()
                .filter(|c| c.id != card.id)
                .map(|c| c.term.as_str())
                .collect();
            let mut options: Vec<String> = others
                .choose_multiple(rng, 3)
                .map(|t| t.to_string())
                .collect();
            options.push(card.term.clone());
            options.shuffle(rng);

            SessionQuestion {
                card_id: card.id,
                prompt: card.definition.clone(),
                options,
                correct_answer: card.term.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    use crate::auth::MemoryUsers;
    use crate::decks::{Deck, MemoryDecks, MemoryProgress, UserDeckProgress};
    use crate::generation::GeneratedQuestion;

    struct StubGenerator {
        fail_all: AtomicBool,
    }

    impl StubGenerator {
        fn new() -> Self {
            Self {
                fail_all: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl QuestionGenerator for StubGenerator {
        async fn generate_question(&self, card: &Flashcard) -> Result<GeneratedQuestion> {
            if self.fail_all.load(Ordering::SeqCst) {
                return Err(EngineError::GenerationFailure("stubbed outage".into()));
            }
            Ok(GeneratedQuestion {
                question: format!("Which term matches: {}?", card.definition),
                correct_answer: card.term.clone(),
                options: [
                    card.term.clone(),
                    "alpha".to_string(),
                    "beta".to_string(),
                    "gamma".to_string(),
                ],
                source_card_id: card.id,
            })
        }

        async fn generate_flashcards_from_notes(&self, _notes: &str) -> Result<Vec<NoteCard>> {
            Ok(vec![NoteCard {
                question: "q".to_string(),
                answer: "a".to_string(),
            }])
        }
    }

    struct Fixture {
        _dir: TempDir,
        engine: StudyEngine,
        users: Arc<MemoryUsers>,
        decks: Arc<MemoryDecks>,
        progress: Arc<MemoryProgress>,
        generator: Arc<StubGenerator>,
        user_id: Uuid,
        deck_id: Uuid,
    }

    fn fixture(card_count: usize) -> Fixture {
        let dir = TempDir::new().unwrap();
        let user_id = Uuid::new_v4();
        let users = Arc::new(MemoryUsers::signed_in(User {
            id: user_id,
            email_verified: true,
        }));

        let deck = Deck::new(user_id, "Biology 101".to_string());
        let deck_id = deck.id;
        let cards: Vec<Flashcard> = (0..card_count)
            .map(|i| {
                let mut c = Flashcard::new(deck_id, format!("term-{}", i), format!("def-{}", i));
                c.position = i as i32;
                c
            })
            .collect();
        let decks = Arc::new(MemoryDecks::new());
        decks.insert_deck(deck, cards);

        let progress = Arc::new(MemoryProgress::new());
        let generator = Arc::new(StubGenerator::new());
        let engine = StudyEngine::new(
            users.clone(),
            decks.clone(),
            progress.clone(),
            generator.clone(),
            dir.path().to_path_buf(),
        )
        .unwrap()
        .with_rng_seed(42);

        Fixture {
            _dir: dir,
            engine,
            users,
            decks,
            progress,
            generator,
            user_id,
            deck_id,
        }
    }

    fn grant_quiz_eligibility(fx: &Fixture) {
        let row = UserDeckProgress {
            user_id: fx.user_id,
            deck_id: fx.deck_id,
            mastery: 10,
            completed_sessions: 3,
            challenge_completed: 3,
            last_studied: None,
        };
        // The engine reads eligibility through the deck source and commits
        // through the progress store; both need the same starting row.
        fx.decks.set_progress(row.clone());
        fx.progress.seed(row);
    }

    // ---------- auth ----------

    #[test]
    fn signed_out_user_cannot_start() {
        let fx = fixture(8);
        fx.users.sign_out();
        assert!(matches!(
            fx.engine.start_flip(fx.deck_id),
            Err(EngineError::Unauthorized)
        ));
    }

    #[test]
    fn session_mutations_require_the_owning_user() {
        let fx = fixture(12);
        let flip_id = fx.engine.start_flip(fx.deck_id).unwrap().session_id;
        let challenge_id = fx
            .engine
            .start_challenge(fx.deck_id, RoundCount::Three, false)
            .unwrap()
            .session_id;
        for _ in 0..8 {
            fx.engine.answer(challenge_id, true).unwrap();
        }

        // Holding a session id is not enough without a verified identity.
        fx.users.sign_out();
        assert!(matches!(
            fx.engine.flip(flip_id),
            Err(EngineError::Unauthorized)
        ));
        assert!(matches!(
            fx.engine.next_card(flip_id),
            Err(EngineError::Unauthorized)
        ));
        assert!(matches!(
            fx.engine.prev_card(flip_id),
            Err(EngineError::Unauthorized)
        ));
        assert!(matches!(
            fx.engine.shuffle(flip_id),
            Err(EngineError::Unauthorized)
        ));
        assert!(matches!(
            fx.engine.advance_round(challenge_id),
            Err(EngineError::Unauthorized)
        ));

        // Nor is a verified identity that does not own the session.
        fx.users.sign_in(User {
            id: Uuid::new_v4(),
            email_verified: true,
        });
        assert!(matches!(
            fx.engine.next_card(flip_id),
            Err(EngineError::Unauthorized)
        ));
        assert!(matches!(
            fx.engine.advance_round(challenge_id),
            Err(EngineError::Unauthorized)
        ));

        // The owner can still proceed afterwards.
        fx.users.sign_in(User {
            id: fx.user_id,
            email_verified: true,
        });
        assert!(fx.engine.next_card(flip_id).is_ok());
        assert_eq!(
            fx.engine.advance_round(challenge_id).unwrap().round,
            2
        );
    }

    // ---------- flip ----------

    #[test]
    fn flip_navigation_wraps_circularly() {
        let fx = fixture(3);
        let snap = fx.engine.start_flip(fx.deck_id).unwrap();
        assert_eq!(snap.state, SessionState::InProgress);
        assert_eq!(snap.cards_in_round, 3);

        let id = snap.session_id;
        assert_eq!(fx.engine.next_card(id).unwrap().position, 1);
        assert_eq!(fx.engine.next_card(id).unwrap().position, 2);
        assert_eq!(fx.engine.next_card(id).unwrap().position, 0);
        assert_eq!(fx.engine.prev_card(id).unwrap().position, 2);
    }

    #[test]
    fn flip_toggles_without_transition() {
        let fx = fixture(3);
        let id = fx.engine.start_flip(fx.deck_id).unwrap().session_id;

        let snap = fx.engine.flip(id).unwrap();
        assert_eq!(snap.state, SessionState::InProgress);
        assert_eq!(snap.position, 0);
    }

    #[test]
    fn shuffle_resets_position() {
        let fx = fixture(6);
        let id = fx.engine.start_flip(fx.deck_id).unwrap().session_id;

        fx.engine.next_card(id).unwrap();
        fx.engine.next_card(id).unwrap();
        let snap = fx.engine.shuffle(id).unwrap();
        assert_eq!(snap.position, 0);
    }

    #[test]
    fn flip_session_grants_one_mastery_point_after_a_minute() {
        let fx = fixture(5);
        let id = fx.engine.start_flip(fx.deck_id).unwrap().session_id;

        let outcome = fx.engine.end(id, 75).unwrap();
        assert_eq!(outcome.mastery, 1);
        assert_eq!(outcome.completed_sessions, 1);

        let row = fx.progress.row(fx.user_id, fx.deck_id).unwrap();
        assert_eq!(row.mastery, 1);
        assert_eq!(row.challenge_completed, 0);
    }

    #[test]
    fn short_flip_session_changes_nothing() {
        let fx = fixture(5);
        let id = fx.engine.start_flip(fx.deck_id).unwrap().session_id;
        let outcome = fx.engine.end(id, 30).unwrap();
        assert_eq!(outcome.mastery, 0);
    }

    #[test]
    fn answers_rejected_in_flip_mode() {
        let fx = fixture(5);
        let id = fx.engine.start_flip(fx.deck_id).unwrap().session_id;
        assert!(matches!(
            fx.engine.answer(id, true),
            Err(EngineError::InvalidAction(_))
        ));
    }

    // ---------- challenge ----------

    #[test]
    fn challenge_requires_four_cards() {
        let fx = fixture(3);
        assert!(matches!(
            fx.engine.start_challenge(fx.deck_id, RoundCount::One, false),
            Err(EngineError::NotEligible(_))
        ));
    }

    #[test]
    fn challenge_questions_have_four_shuffled_options() {
        let fx = fixture(12);
        let id = fx
            .engine
            .start_challenge(fx.deck_id, RoundCount::Three, false)
            .unwrap()
            .session_id;

        let sessions = fx.engine.sessions.lock().unwrap();
        let session = sessions.get(&id).unwrap();
        assert_eq!(session.questions.len(), 8);
        for q in &session.questions {
            assert_eq!(q.options.len(), 4);
            assert!(q.options.contains(&q.correct_answer));
        }
    }

    #[test]
    fn round_transition_resets_round_tallies_only() {
        let fx = fixture(12);
        let id = fx
            .engine
            .start_challenge(fx.deck_id, RoundCount::Three, false)
            .unwrap()
            .session_id;

        // 8 questions per round with 3 rounds configured.
        for i in 0..8 {
            let snap = fx.engine.answer(id, i % 2 == 0).unwrap();
            if i < 7 {
                assert_eq!(snap.state, SessionState::InProgress);
            } else {
                assert_eq!(snap.state, SessionState::RoundComplete);
                assert_eq!(snap.round, 1);
            }
        }

        let snap = fx.engine.advance_round(id).unwrap();
        assert_eq!(snap.state, SessionState::InProgress);
        assert_eq!(snap.round, 2);
        assert_eq!(snap.position, 0);
        assert_eq!(snap.round_correct, 0);
        assert_eq!(snap.round_incorrect, 0);
        assert_eq!(snap.correct, 4);
        assert_eq!(snap.incorrect, 4);
    }

    #[test]
    fn finished_challenge_commits_mastery_and_challenge_count() {
        // Deck of 8 cards, single round: 8 questions, 6 answered correctly
        // from a mastery baseline of 10 gives 10 + 6 - 2 = 14.
        let fx = fixture(8);
        fx.decks.set_progress(UserDeckProgress {
            user_id: fx.user_id,
            deck_id: fx.deck_id,
            mastery: 10,
            completed_sessions: 0,
            challenge_completed: 0,
            last_studied: None,
        });

        let id = fx
            .engine
            .start_challenge(fx.deck_id, RoundCount::One, false)
            .unwrap()
            .session_id;

        for i in 0..8 {
            let snap = fx.engine.answer(id, i < 6).unwrap();
            if i == 7 {
                assert_eq!(snap.state, SessionState::Saving);
            }
        }

        let outcome = fx.engine.end(id, 240).unwrap();
        assert_eq!(outcome.mastery, 14);

        let row = fx.progress.row(fx.user_id, fx.deck_id).unwrap();
        assert_eq!(row.mastery, 14);
        assert_eq!(row.challenge_completed, 1);
        assert_eq!(row.completed_sessions, 1);
    }

    #[test]
    fn abandoned_challenge_does_not_count_as_completed() {
        let fx = fixture(8);
        let id = fx
            .engine
            .start_challenge(fx.deck_id, RoundCount::Three, false)
            .unwrap()
            .session_id;

        fx.engine.answer(id, true).unwrap();
        fx.engine.end(id, 30).unwrap();

        let row = fx.progress.row(fx.user_id, fx.deck_id).unwrap();
        assert_eq!(row.challenge_completed, 0);
        assert_eq!(row.completed_sessions, 1);
    }

    #[test]
    fn answers_update_the_performance_store() {
        let fx = fixture(8);
        let id = fx
            .engine
            .start_challenge(fx.deck_id, RoundCount::One, false)
            .unwrap()
            .session_id;

        let first_card = {
            let sessions = fx.engine.sessions.lock().unwrap();
            sessions.get(&id).unwrap().questions[0].card_id
        };
        fx.engine.answer(id, false).unwrap();

        let counters = fx.engine.performance().counters(fx.user_id, first_card).unwrap();
        assert_eq!(counters.num_incorrect, 1);
    }

    // ---------- timeouts ----------

    #[test]
    fn timeout_counts_as_incorrect_and_advances() {
        let fx = fixture(12);
        let id = fx
            .engine
            .start_challenge(fx.deck_id, RoundCount::Three, true)
            .unwrap()
            .session_id;

        let snap = fx
            .engine
            .handle_timeout(TimeoutEvent {
                session_id: id,
                position: 0,
            })
            .expect("timeout for the current question applies");
        assert_eq!(snap.position, 1);
        assert_eq!(snap.incorrect, 1);
    }

    #[test]
    fn stale_timeout_is_discarded() {
        let fx = fixture(12);
        let id = fx
            .engine
            .start_challenge(fx.deck_id, RoundCount::Three, true)
            .unwrap()
            .session_id;

        fx.engine.answer(id, true).unwrap(); // now at position 1
        let stale = fx.engine.handle_timeout(TimeoutEvent {
            session_id: id,
            position: 0,
        });
        assert!(stale.is_none());
        assert_eq!(fx.engine.snapshot(id).unwrap().incorrect, 0);
    }

    #[test]
    fn timeout_ignored_for_untimed_sessions() {
        let fx = fixture(12);
        let id = fx
            .engine
            .start_challenge(fx.deck_id, RoundCount::Three, false)
            .unwrap()
            .session_id;

        assert!(fx
            .engine
            .handle_timeout(TimeoutEvent {
                session_id: id,
                position: 0,
            })
            .is_none());
    }

    // ---------- quiz ----------

    #[test]
    fn quiz_token_requires_eligibility() {
        let fx = fixture(12);
        // No progress yet: mastery and challenge count are zero.
        assert!(matches!(
            fx.engine.issue_quiz_token(fx.deck_id, 5),
            Err(EngineError::NotEligible(_))
        ));

        let small = fixture(6);
        grant_quiz_eligibility(&small);
        small.engine.credits().set_balance(small.user_id, 5);
        assert!(matches!(
            small.engine.issue_quiz_token(small.deck_id, 5),
            Err(EngineError::NotEligible(_))
        ));
    }

    #[test]
    fn quiz_token_requires_credits() {
        let fx = fixture(12);
        grant_quiz_eligibility(&fx);
        assert!(matches!(
            fx.engine.issue_quiz_token(fx.deck_id, 5),
            Err(EngineError::InsufficientCredits)
        ));
    }

    #[tokio::test]
    async fn quiz_happy_path() {
        let fx = fixture(12);
        grant_quiz_eligibility(&fx);
        fx.engine.credits().set_balance(fx.user_id, 2);

        let issued = fx.engine.issue_quiz_token(fx.deck_id, 5).unwrap();
        assert_eq!(issued.num_questions, 5);
        assert_eq!(fx.engine.credits().balance(fx.user_id), 1);

        let snap = fx.engine.start_quiz(fx.deck_id, &issued.token).await.unwrap();
        assert_eq!(snap.mode, StudyMode::Quiz);
        assert_eq!(snap.state, SessionState::InProgress);
        assert_eq!(snap.cards_in_round, 5);
        assert_eq!(snap.total_rounds, 1);

        for i in 0..5 {
            let snap = fx.engine.answer(snap.session_id, i != 0).unwrap();
            if i == 4 {
                assert_eq!(snap.state, SessionState::Saving);
            }
        }

        let outcome = fx.engine.end(snap.session_id, 120).unwrap();
        // 10 baseline + 4 correct - 1 incorrect.
        assert_eq!(outcome.mastery, 13);
        let row = fx.progress.row(fx.user_id, fx.deck_id).unwrap();
        assert_eq!(row.challenge_completed, 3); // unchanged by quiz
        assert_eq!(row.completed_sessions, 4);
    }

    #[tokio::test]
    async fn quiz_token_is_single_use() {
        let fx = fixture(12);
        grant_quiz_eligibility(&fx);
        fx.engine.credits().set_balance(fx.user_id, 1);

        let issued = fx.engine.issue_quiz_token(fx.deck_id, 4).unwrap();
        fx.engine.start_quiz(fx.deck_id, &issued.token).await.unwrap();

        assert!(matches!(
            fx.engine.start_quiz(fx.deck_id, &issued.token).await,
            Err(EngineError::InvalidOrExpiredToken)
        ));
    }

    #[tokio::test]
    async fn failed_generation_consumes_the_token() {
        let fx = fixture(12);
        grant_quiz_eligibility(&fx);
        fx.engine.credits().set_balance(fx.user_id, 1);
        fx.generator.fail_all.store(true, Ordering::SeqCst);

        let issued = fx.engine.issue_quiz_token(fx.deck_id, 4).unwrap();
        let err = fx
            .engine
            .start_quiz(fx.deck_id, &issued.token)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::GenerationFailure(_)));

        // No refund: the token stays consumed and the credit stays spent.
        fx.generator.fail_all.store(false, Ordering::SeqCst);
        assert!(matches!(
            fx.engine.start_quiz(fx.deck_id, &issued.token).await,
            Err(EngineError::InvalidOrExpiredToken)
        ));
        assert_eq!(fx.engine.credits().balance(fx.user_id), 0);
    }

    #[tokio::test]
    async fn redeem_surface_matches_start_quiz() {
        let fx = fixture(12);
        grant_quiz_eligibility(&fx);
        fx.engine.credits().set_balance(fx.user_id, 1);

        let issued = fx.engine.issue_quiz_token(fx.deck_id, 6).unwrap();
        assert_eq!(fx.engine.redeem_quiz_token(fx.deck_id, &issued.token).unwrap(), 6);

        // Already redeemed, so the session start must fail.
        assert!(matches!(
            fx.engine.start_quiz(fx.deck_id, &issued.token).await,
            Err(EngineError::InvalidOrExpiredToken)
        ));
    }

    // ---------- commit retry ----------

    #[test]
    fn failed_commit_keeps_session_for_retry() {
        let fx = fixture(5);
        let id = fx.engine.start_flip(fx.deck_id).unwrap().session_id;

        fx.progress.set_failing(true);
        let err = fx.engine.end(id, 90).unwrap_err();
        assert!(matches!(err, EngineError::PersistenceFailure(_)));

        // Session survives in Saving; the retry commits the same result.
        assert_eq!(fx.engine.snapshot(id).unwrap().state, SessionState::Saving);
        fx.progress.set_failing(false);
        let outcome = fx.engine.end(id, 90).unwrap();
        assert_eq!(outcome.mastery, 1);
    }

    // ---------- batch recording ----------

    #[test]
    fn batch_recording_reports_partial_success() {
        let fx = fixture(5);
        let card = Uuid::new_v4();
        let outcome = fx
            .engine
            .record_answers(&[
                AnswerRecord {
                    flashcard_id: card,
                    is_correct: true,
                },
                AnswerRecord {
                    flashcard_id: Uuid::nil(),
                    is_correct: true,
                },
            ])
            .unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.failed, 1);
    }
}
