//! Mastery ledger
//!
//! Pure computation of a deck's mastery value after a study session.
//! Mastery is a bounded accumulator in 0..=100, not a scheduling interval:
//!
//! - Challenge and Quiz sessions move mastery by `correct - incorrect`.
//! - Flip sessions have no right/wrong signal; they reward completion with
//!   a flat +1 when the user studied for at least a minute, and can never
//!   push mastery past 50. Crossing the midpoint requires Challenge/Quiz.
//!
//! Deterministic given identical inputs: no clock reads, no randomness.

use crate::session::StudyMode;

/// Upper bound of the mastery scale
pub const MASTERY_MAX: i32 = 100;

/// Ceiling reachable through Flip-mode study alone
pub const FLIP_MASTERY_CEILING: i32 = 50;

/// Minimum studied time for a Flip session to count, in seconds
pub const FLIP_MIN_STUDY_SECS: u64 = 60;

/// Clamp a raw mastery value into the valid scale.
pub fn clamp_mastery(raw: i32) -> i32 {
    raw.clamp(0, MASTERY_MAX)
}

/// Compute the mastery value after a completed session.
///
/// `studied_secs` is only consulted for Flip mode.
pub fn session_mastery(
    previous: i32,
    correct: u32,
    incorrect: u32,
    mode: StudyMode,
    studied_secs: u64,
) -> i32 {
    let previous = clamp_mastery(previous);
    match mode {
        StudyMode::Challenge | StudyMode::Quiz => {
            let delta = correct as i32 - incorrect as i32;
            clamp_mastery(previous + delta)
        }
        StudyMode::Flip => {
            let raw = if studied_secs >= FLIP_MIN_STUDY_SECS && previous <= FLIP_MASTERY_CEILING {
                previous + 1
            } else {
                previous
            };
            // Flip can never raise mastery above the midpoint, but it must
            // not lower an already-higher value either.
            clamp_mastery(raw.min(FLIP_MASTERY_CEILING.max(previous)))
        }
    }
}
