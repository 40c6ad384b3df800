//! Adaptive card selector
//!
//! Picks which cards an AI-generated quiz should test, from the user's
//! per-card answer history. Two stages:
//!
//! 1. Rank all cards by struggle ratio (incorrect / max(correct, 1)),
//!    highest first; among untroubled cards (ratio zero) the least
//!    attempted come first, so unseen cards surface before mastered ones.
//! 2. Take a pool of `2 * count` top candidates, shuffle it uniformly,
//!    and truncate to `count`.
//!
//! Pure ranking would produce the same quiz every session; pure random
//! sampling would ignore the performance signal. The widened pool plus
//! shuffle keeps quizzes focused on weak cards without repeating the
//! identical set every time.

use std::cmp::Ordering;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::performance::CardWithPerformance;

/// Rank cards by descending struggle ratio, ties broken by ascending
/// total attempts.
pub(crate) fn rank(cards: &[CardWithPerformance]) -> Vec<CardWithPerformance> {
    let mut ranked = cards.to_vec();
    ranked.sort_by(|a, b| {
        match b
            .struggle_ratio()
            .partial_cmp(&a.struggle_ratio())
            .unwrap_or(Ordering::Equal)
        {
            Ordering::Equal => a.counters.attempts().cmp(&b.counters.attempts()),
            other => other,
        }
    });
    ranked
}

/// Select `count` cards for quiz generation.
///
/// Returns fewer than `count` cards when the deck is smaller than the
/// request. The random source is injected so callers can seed it.
pub fn select<R: Rng + ?Sized>(
    cards: &[CardWithPerformance],
    count: usize,
    rng: &mut R,
) -> Vec<CardWithPerformance> {
    if cards.is_empty() || count == 0 {
        return Vec::new();
    }

    let pool_size = (count * 2).min(cards.len());
    let mut pool: Vec<CardWithPerformance> = rank(cards).into_iter().take(pool_size).collect();
    pool.shuffle(rng);
    pool.truncate(count);
    pool
}
