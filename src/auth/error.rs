//! Typed outcomes for authentication flows.
//!
//! Security-relevant outcomes (bad credentials, rate limits, rejected or
//! expired challenges and tokens) are ordinary values of [`AuthError`] and
//! are never panics. Infrastructure failures travel in the distinct
//! [`AuthError::Unavailable`] category; the transport layer maps both to
//! status codes directly, with no string matching.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown identifier or wrong password. Deliberately a single variant:
    /// callers must not be able to tell which it was.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The client IP is inside a block window. `retry_after` is `None` when
    /// the block is permanent.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("challenge expired")]
    ChallengeExpired,

    #[error("challenge code mismatch")]
    ChallengeMismatch,

    /// The challenge was already consumed, or never existed.
    #[error("challenge not found")]
    ChallengeNotFound,

    #[error("token expired")]
    TokenExpired,

    #[error("token not found")]
    TokenNotFound,

    /// Persistent store or collaborator failure. Not a security outcome.
    #[error("auth store unavailable")]
    Unavailable(#[source] anyhow::Error),
}

impl AuthError {
    pub(crate) fn unavailable(err: anyhow::Error) -> Self {
        Self::Unavailable(err)
    }

    /// True for outcomes an attacker can trigger on purpose; these must be
    /// returned to the caller without detail that would aid probing.
    #[must_use]
    pub fn is_security_outcome(&self) -> bool {
        !matches!(self, Self::Unavailable(_))
    }
}
