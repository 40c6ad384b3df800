//! Credit ledger operations

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use uuid::Uuid;

use crate::error::{EngineError, Result};

use super::models::{CreditBalance, Plan};

/// Refill window: a balance tops up at most once per rolling 24 hours.
const REFILL_WINDOW_HOURS: i64 = 24;

/// Per-user credit balances with atomic debit.
///
/// All balance mutations happen under one lock so a debit is a single
/// read-modify-write: two near-simultaneous debits against a balance of 1
/// produce exactly one success, and the balance never goes negative.
pub struct CreditLedger {
    balances: Mutex<HashMap<Uuid, CreditBalance>>,
}

impl CreditLedger {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
        }
    }

    /// Current balance, zero for unknown users.
    pub fn balance(&self, user_id: Uuid) -> u32 {
        self.balances
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|b| b.balance)
            .unwrap_or(0)
    }

    /// Overwrite a user's balance (host-side sync, tests).
    pub fn set_balance(&self, user_id: Uuid, balance: u32) {
        let mut balances = self.balances.lock().unwrap();
        balances.entry(user_id).or_default().balance = balance;
    }

    /// Debit exactly one credit, failing without mutation when the balance
    /// is already zero.
    pub fn debit(&self, user_id: Uuid) -> Result<u32> {
        let mut balances = self.balances.lock().unwrap();
        let entry = balances.entry(user_id).or_default();
        if entry.balance == 0 {
            return Err(EngineError::InsufficientCredits);
        }
        entry.balance -= 1;
        debug!("debited 1 credit from {}, {} left", user_id, entry.balance);
        Ok(entry.balance)
    }

    /// Refill the balance to the plan ceiling if the rolling 24h window has
    /// elapsed since the last refill. Returns the resulting balance either
    /// way; a refill never lowers a balance.
    pub fn refill_if_due(&self, user_id: Uuid, plan: Plan) -> u32 {
        self.refill_if_due_at(user_id, plan, Utc::now())
    }

    pub fn refill_if_due_at(&self, user_id: Uuid, plan: Plan, now: DateTime<Utc>) -> u32 {
        let mut balances = self.balances.lock().unwrap();
        let entry = balances.entry(user_id).or_default();

        let due = match entry.last_refill {
            None => true,
            Some(last) => now - last >= Duration::hours(REFILL_WINDOW_HOURS),
        };
        if due && entry.balance < plan.credit_ceiling() {
            info!(
                "refilling credits for {}: {} -> {}",
                user_id,
                entry.balance,
                plan.credit_ceiling()
            );
            entry.balance = plan.credit_ceiling();
            entry.last_refill = Some(now);
        }
        entry.balance
    }
}

impl Default for CreditLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn debit_is_monotonic_and_bounded() {
        let ledger = CreditLedger::new();
        let user = Uuid::new_v4();
        ledger.set_balance(user, 3);

        assert_eq!(ledger.debit(user).unwrap(), 2);
        assert_eq!(ledger.debit(user).unwrap(), 1);
        assert_eq!(ledger.debit(user).unwrap(), 0);
        assert!(matches!(
            ledger.debit(user),
            Err(EngineError::InsufficientCredits)
        ));
        assert_eq!(ledger.balance(user), 0);
    }

    #[test]
    fn concurrent_debits_never_go_negative() {
        let ledger = Arc::new(CreditLedger::new());
        let user = Uuid::new_v4();
        ledger.set_balance(user, 16);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    let mut wins = 0u32;
                    for _ in 0..10 {
                        if ledger.debit(user).is_ok() {
                            wins += 1;
                        }
                    }
                    wins
                })
            })
            .collect();

        let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 16);
        assert_eq!(ledger.balance(user), 0);
    }

    #[test]
    fn refill_tops_up_to_plan_ceiling() {
        let ledger = CreditLedger::new();
        let user = Uuid::new_v4();
        let now = Utc::now();

        assert_eq!(ledger.refill_if_due_at(user, Plan::Free, now), 10);
        assert_eq!(ledger.refill_if_due_at(Uuid::new_v4(), Plan::Pro, now), 100);
    }

    #[test]
    fn refill_respects_rolling_window() {
        let ledger = CreditLedger::new();
        let user = Uuid::new_v4();
        let start = Utc::now();

        assert_eq!(ledger.refill_if_due_at(user, Plan::Plus, start), 50);
        for _ in 0..50 {
            ledger.debit(user).unwrap();
        }

        // Inside the window nothing happens, at 24h the refill fires.
        let later = start + Duration::hours(23);
        assert_eq!(ledger.refill_if_due_at(user, Plan::Plus, later), 0);
        let next_day = start + Duration::hours(24);
        assert_eq!(ledger.refill_if_due_at(user, Plan::Plus, next_day), 50);
    }

    #[test]
    fn refill_never_lowers_a_balance() {
        let ledger = CreditLedger::new();
        let user = Uuid::new_v4();
        ledger.set_balance(user, 80);

        assert_eq!(ledger.refill_if_due_at(user, Plan::Plus, Utc::now()), 80);
    }
}
