//! Study sessions
//!
//! This module provides:
//! - The per-mode session data model (Flip, Challenge, Quiz)
//! - The session state machine and its engine aggregate
//! - The per-question countdown tick source for timed Challenge play

pub mod machine;
pub mod models;
pub mod timer;

pub use machine::StudyEngine;
pub use models::*;
pub use timer::{QuestionTimer, TimeoutEvent};
