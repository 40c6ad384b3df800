//! User identity boundary
//!
//! Authentication lives outside this crate. The engine only needs to know
//! who the current user is and whether their email is verified; every
//! mutating operation refuses unverified users.

use std::sync::Mutex;

use uuid::Uuid;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email_verified: bool,
}

/// Read access to the signed-in user, provided by the host application.
pub trait UserDirectory: Send + Sync {
    /// The currently signed-in user, if any.
    fn current_user(&self) -> Option<User>;
}

/// Resolve the current user, rejecting missing or unverified identities.
pub fn require_verified_user(users: &dyn UserDirectory) -> Result<User> {
    match users.current_user() {
        Some(user) if user.email_verified => Ok(user),
        _ => Err(EngineError::Unauthorized),
    }
}

/// In-memory directory holding one switchable identity.
pub struct MemoryUsers {
    current: Mutex<Option<User>>,
}

impl MemoryUsers {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    pub fn signed_in(user: User) -> Self {
        let users = Self::new();
        users.sign_in(user);
        users
    }

    pub fn sign_in(&self, user: User) {
        *self.current.lock().unwrap() = Some(user);
    }

    pub fn sign_out(&self) {
        *self.current.lock().unwrap() = None;
    }
}

impl Default for MemoryUsers {
    fn default() -> Self {
        Self::new()
    }
}

impl UserDirectory for MemoryUsers {
    fn current_user(&self) -> Option<User> {
        self.current.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_signed_out() {
        let users = MemoryUsers::new();
        assert!(matches!(
            require_verified_user(&users),
            Err(EngineError::Unauthorized)
        ));
    }

    #[test]
    fn rejects_unverified() {
        let users = MemoryUsers::signed_in(User {
            id: Uuid::new_v4(),
            email_verified: false,
        });
        assert!(matches!(
            require_verified_user(&users),
            Err(EngineError::Unauthorized)
        ));
    }

    #[test]
    fn accepts_verified() {
        let id = Uuid::new_v4();
        let users = MemoryUsers::signed_in(User {
            id,
            email_verified: true,
        });
        assert_eq!(require_verified_user(&users).unwrap().id, id);
    }
}
