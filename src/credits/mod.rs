//! Energy credit metering for AI generation
//!
//! Each generation request costs one credit. Balances refill to a
//! plan-dependent ceiling at most once per rolling 24-hour window.

pub mod ledger;
pub mod models;

pub use ledger::CreditLedger;
pub use models::*;
