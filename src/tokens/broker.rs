//! Token issuance and redemption

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::{debug, info};
use uuid::Uuid;

use crate::credits::CreditLedger;
use crate::error::{EngineError, Result};

use super::models::{IssuedToken, QuizAccessToken};

/// Issues and redeems quiz access tokens.
///
/// Deck/mastery eligibility is checked upstream; the broker enforces only
/// token-level invariants. Both `issue` and `redeem` run under one lock so
/// each is a single read-modify-write: concurrent redemptions of the same
/// token see exactly one winner, with no separate check-then-flip window.
pub struct TokenBroker {
    tokens: Mutex<Vec<QuizAccessToken>>,
}

impl TokenBroker {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(Vec::new()),
        }
    }

    /// Issue a fresh token for `(user, deck)`, superseding any unredeemed
    /// predecessor for the pair. A credit is debited first; the token only
    /// exists if the debit succeeded. The debit is not refunded if the
    /// token is never redeemed.
    pub fn issue(
        &self,
        credits: &CreditLedger,
        user_id: Uuid,
        deck_id: Uuid,
        num_questions: u32,
    ) -> Result<IssuedToken> {
        self.issue_at(credits, user_id, deck_id, num_questions, Utc::now())
    }

    pub fn issue_at(
        &self,
        credits: &CreditLedger,
        user_id: Uuid,
        deck_id: Uuid,
        num_questions: u32,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken> {
        let mut tokens = self.tokens.lock().unwrap();

        // Debit while holding the token lock so a token is inserted only
        // if a credit was available and already spent.
        credits.debit(user_id)?;

        let before = tokens.len();
        tokens.retain(|t| t.used || t.user_id != user_id || t.deck_id != deck_id);
        if tokens.len() < before {
            debug!("superseded unused quiz token for user {}", user_id);
        }

        let token = QuizAccessToken::new(user_id, deck_id, num_questions, now);
        let issued = IssuedToken {
            token: token.token.clone(),
            num_questions: token.num_questions,
            expires_at: token.expires_at,
        };
        info!(
            "issued quiz token for user {} deck {} ({} questions)",
            user_id, deck_id, num_questions
        );
        tokens.push(token);
        Ok(issued)
    }

    /// Redeem a token, returning its question count.
    ///
    /// Succeeds at most once per token. Any mismatch — unknown token,
    /// wrong owner or deck, already used, expired — fails with the same
    /// uniform error so the caller learns nothing about why.
    pub fn redeem(&self, token: &str, user_id: Uuid, deck_id: Uuid) -> Result<u32> {
        self.redeem_at(token, user_id, deck_id, Utc::now())
    }

    pub fn redeem_at(
        &self,
        token: &str,
        user_id: Uuid,
        deck_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u32> {
        let mut tokens = self.tokens.lock().unwrap();

        // Match and flip in one step under the lock.
        let found = tokens.iter_mut().find(|t| {
            t.token == token
                && t.user_id == user_id
                && t.deck_id == deck_id
                && !t.used
                && !t.is_expired(now)
        });

        match found {
            Some(t) => {
                t.used = true;
                info!("redeemed quiz token for user {} deck {}", user_id, deck_id);
                Ok(t.num_questions)
            }
            None => Err(EngineError::InvalidOrExpiredToken),
        }
    }
}

impl Default for TokenBroker {
    fn default() -> Self {
        Self::new()
    }
}
