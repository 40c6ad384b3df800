//! Data models for quiz access tokens

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token lifetime from issuance to expiry
pub const TOKEN_TTL_MINUTES: i64 = 15;

/// A single-use credential for one paid quiz generation.
///
/// At most one unused token exists per (user, deck); issuing a new one
/// deletes any unredeemed predecessor. `used` flips to true exactly once
/// and never back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAccessToken {
    pub id: Uuid,
    /// Opaque token string handed to the caller
    pub token: String,
    pub user_id: Uuid,
    pub deck_id: Uuid,
    pub num_questions: u32,
    #[serde(default)]
    pub used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl QuizAccessToken {
    pub fn new(user_id: Uuid, deck_id: Uuid, num_questions: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            token: Uuid::new_v4().simple().to_string(),
            user_id,
            deck_id,
            num_questions,
            used: false,
            expires_at: now + Duration::minutes(TOKEN_TTL_MINUTES),
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// What `issue` hands back to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub num_questions: u32,
    pub expires_at: DateTime<Utc>,
}
