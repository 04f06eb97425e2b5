//! Acting identity, supplied by the caller's auth layer.

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::UserId;
use crate::shared::error::{ChatError, ChatResult};

/// Role of the acting user. Admins bypass membership for admin operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

/// The user performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: UserRole,
}

impl Actor {
    pub fn user(id: UserId) -> Self {
        Self {
            id,
            role: UserRole::User,
        }
    }

    pub fn admin(id: UserId) -> Self {
        Self {
            id,
            role: UserRole::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// `Forbidden` unless the actor is an admin.
    pub fn require_admin(&self) -> ChatResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ChatError::forbidden("Admin role required"))
        }
    }
}
