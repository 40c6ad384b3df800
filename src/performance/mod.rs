//! Per-card answer performance tracking
//!
//! This module provides:
//! - Per-user correct/incorrect counters for each flashcard
//! - Single and batched answer recording
//! - The performance view consumed by the adaptive selector

pub mod models;
pub mod store;

pub use models::*;
pub use store::PerformanceStore;
