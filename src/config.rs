//! Auth configuration loaded at startup.

use tracing::warn;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_EMAIL_CHALLENGE_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_TOTP_ISSUER: &str = "portiro";

const ENV_SESSION_TTL: &str = "PORTIRO_SESSION_TTL_SECONDS";
const ENV_EMAIL_CHALLENGE_TTL: &str = "PORTIRO_EMAIL_CHALLENGE_TTL_SECONDS";
const ENV_TOTP_ISSUER: &str = "PORTIRO_TOTP_ISSUER";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    session_ttl_seconds: i64,
    email_challenge_ttl_seconds: i64,
    totp_issuer: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            email_challenge_ttl_seconds: DEFAULT_EMAIL_CHALLENGE_TTL_SECONDS,
            totp_issuer: DEFAULT_TOTP_ISSUER.to_string(),
        }
    }

    /// Read overrides from `PORTIRO_*` environment variables, keeping the
    /// defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Some(seconds) = read_seconds(ENV_SESSION_TTL) {
            config.session_ttl_seconds = seconds;
        }
        if let Some(seconds) = read_seconds(ENV_EMAIL_CHALLENGE_TTL) {
            config.email_challenge_ttl_seconds = seconds;
        }
        if let Ok(issuer) = std::env::var(ENV_TOTP_ISSUER) {
            let issuer = issuer.trim().to_string();
            if !issuer.is_empty() {
                config.totp_issuer = issuer;
            }
        }
        config
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_email_challenge_ttl_seconds(mut self, seconds: i64) -> Self {
        self.email_challenge_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_totp_issuer(mut self, issuer: String) -> Self {
        self.totp_issuer = issuer;
        self
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn email_challenge_ttl_seconds(&self) -> i64 {
        self.email_challenge_ttl_seconds
    }

    #[must_use]
    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }
}

fn read_seconds(var: &str) -> Option<i64> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<i64>() {
        Ok(seconds) if seconds > 0 => Some(seconds),
        _ => {
            warn!("ignoring {var}: expected a positive number of seconds, got {raw:?}");
            None
        }
    }
}
