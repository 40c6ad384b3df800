//! Data models for the credit ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription plan, resolved by the billing collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Plan {
    Free,
    Plus,
    Pro,
}

impl Plan {
    /// Credit ceiling a refill tops the balance up to.
    pub fn credit_ceiling(&self) -> u32 {
        match self {
            Plan::Free => 10,
            Plan::Plus => 50,
            Plan::Pro => 100,
        }
    }
}

/// A user's consumable credit balance and refill bookkeeping.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalance {
    #[serde(default)]
    pub balance: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refill: Option<DateTime<Utc>>,
}
