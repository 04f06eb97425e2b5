//! Chat Error Types
//!
//! One error enum for every logic operation. Transport layers map
//! [`ChatError::kind`] to their own protocol codes.

use serde::Serialize;

/// Coarse error classification exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    BadInput,
    Internal,
}

impl ErrorKind {
    /// Stable code string, e.g. for GraphQL `extensions.code`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::BadInput => "BAD_USER_INPUT",
            Self::Internal => "INTERNAL",
        }
    }
}

/// Chat domain error type
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChatError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn forbidden(what: impl Into<String>) -> Self {
        Self::Forbidden(what.into())
    }

    pub fn bad_input(what: impl Into<String>) -> Self {
        Self::BadInput(what.into())
    }

    /// Classify the error. Store and transport failures are all `Internal`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::BadInput(_) => ErrorKind::BadInput,
            Self::Internal(_) | Self::Database(_) | Self::Redis(_) | Self::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Message safe to show to an end user; internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::NotFound(msg) | Self::Forbidden(msg) | Self::BadInput(msg) => msg.clone(),
            other => {
                tracing::error!(error = %other, "Internal chat error");
                "Internal server error".into()
            }
        }
    }
}

/// Result alias used across the crate.
pub type ChatResult<T> = Result<T, ChatError>;
