//! deckmind — study session and adaptive quiz generation engine
//!
//! Drives flashcard study sessions through three modes (Flip free review,
//! timed Challenge rounds, AI-generated adaptive Quiz), tracks per-card
//! answer performance, folds session results through a bounded mastery
//! ledger, and gates paid quiz generation behind single-use access tokens
//! backed by a metered credit ledger.
//!
//! The surrounding product (auth, deck CRUD, billing, the AI capability
//! itself) stays outside, behind the collaborator traits in [`auth`],
//! [`decks`], and [`generation`].

pub mod auth;
pub mod credits;
pub mod decks;
pub mod error;
pub mod generation;
pub mod mastery;
pub mod performance;
pub mod selector;
pub mod session;
pub mod tokens;

pub use error::{EngineError, OpStatus, Result};
pub use session::StudyEngine;
