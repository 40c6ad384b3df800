//! Quiz access tokens
//!
//! A token is a single-use, 15-minute credential gating one paid quiz
//! generation. Issuing debits a credit up front; redeeming flips the token
//! to used exactly once, no matter how many callers race for it.

pub mod broker;
pub mod models;

pub use broker::TokenBroker;
pub use models::*;
