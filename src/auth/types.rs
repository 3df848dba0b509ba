//! Public result types returned by the auth surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An issued session token. The `token` field is the only copy of the raw
/// value; the store holds a hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    pub token: String,
    pub account_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Result of a login attempt that cleared the rate limit and the password
/// check. Failures (bad credentials, rate limits) are `AuthError` values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoginOutcome {
    /// No further factors configured; a session was issued.
    Granted { token: SessionToken },
    /// The account has TOTP enabled; the caller must follow up with
    /// `verify_second_factor`.
    SecondFactorRequired { account_id: Uuid },
    /// An email one-time code was dispatched; the caller must follow up
    /// with `verify_third_factor` using this challenge id.
    ThirdFactorRequired { challenge_id: Uuid },
    /// The password matched but is past its expiry and must be changed
    /// before a session can be issued.
    PasswordExpired { account_id: Uuid },
}

/// Secret material handed to the user exactly once at TOTP enrollment.
#[derive(Clone, Debug, Serialize)]
pub struct TotpEnrollment {
    pub secret_base32: String,
    pub provisioning_uri: String,
}

/// Answer from the lockout tracker. Reading this may lazily clear an
/// expired block as a side effect; it is not a pure query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockStatus {
    Clear,
    /// `until` is `None` for a permanent block.
    Blocked { until: Option<DateTime<Utc>> },
}

impl BlockStatus {
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}
