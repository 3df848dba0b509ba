//! Opaque session tokens.
//!
//! Tokens are 32 random bytes, base64url-encoded, with a fixed lifetime.
//! Only a SHA-256 hash reaches the store; the raw value exists once, in the
//! `SessionToken` handed back at issuance. Validation never extends the
//! lifetime (no sliding window), and an expired row is deleted the moment
//! its expiry is observed.

use anyhow::anyhow;
use chrono::Duration;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::auth::types::SessionToken;
use crate::auth::utils::{generate_token, hash_token};
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::store::{TokenRecord, TokenStore};

/// Attempts before giving up on generating a non-colliding token.
const ISSUE_RETRIES: u32 = 3;

pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl TokenManager {
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>, config: &AuthConfig) -> Self {
        Self {
            store,
            clock,
            ttl: Duration::seconds(config.session_ttl_seconds()),
        }
    }

    /// Mint a new token for `account_id` and persist its hash.
    pub async fn issue(&self, account_id: Uuid) -> Result<SessionToken, AuthError> {
        let now = self.clock.now();
        let expires_at = now + self.ttl;

        for _ in 0..ISSUE_RETRIES {
            let token = generate_token().map_err(AuthError::unavailable)?;
            let record = TokenRecord {
                token_hash: hash_token(&token),
                account_id,
                issued_at: now,
                expires_at,
            };
            let inserted = self
                .store
                .insert(record)
                .await
                .map_err(AuthError::unavailable)?;
            if inserted {
                debug!(%account_id, %expires_at, "session token issued");
                return Ok(SessionToken {
                    token,
                    account_id,
                    expires_at,
                });
            }
        }
        Err(AuthError::unavailable(anyhow!(
            "failed to generate a unique session token"
        )))
    }

    /// Resolve a raw token to its owning account.
    pub async fn validate(&self, token: &str) -> Result<Uuid, AuthError> {
        let token_hash = hash_token(token);
        let record = self
            .store
            .load(&token_hash)
            .await
            .map_err(AuthError::unavailable)?
            .ok_or(AuthError::TokenNotFound)?;

        if record.expires_at <= self.clock.now() {
            // Lazy deletion: the row dies when its expiry is first seen.
            self.store
                .delete(&token_hash)
                .await
                .map_err(AuthError::unavailable)?;
            return Err(AuthError::TokenExpired);
        }
        Ok(record.account_id)
    }

    /// Delete the token. Idempotent; revoking an unknown token is fine.
    pub async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        self.store
            .delete(&hash_token(token))
            .await
            .map_err(AuthError::unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::memory::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn manager() -> (TokenManager, Arc<ManualClock>) {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryStore::new());
        let config = AuthConfig::new().with_session_ttl_seconds(3600);
        let manager = TokenManager::new(store, clock.clone(), &config);
        (manager, clock)
    }

    #[tokio::test]
    async fn issue_then_validate_round_trips() {
        let (manager, clock) = manager();
        let account_id = Uuid::new_v4();

        let issued = manager.issue(account_id).await.unwrap();
        assert_eq!(issued.account_id, account_id);
        assert_eq!(issued.expires_at, clock.now() + Duration::seconds(3600));

        let resolved = manager.validate(&issued.token).await.unwrap();
        assert_eq!(resolved, account_id);
    }

    #[tokio::test]
    async fn validate_after_ttl_reports_expired_and_deletes() {
        let (manager, clock) = manager();
        let issued = manager.issue(Uuid::new_v4()).await.unwrap();

        clock.advance(Duration::seconds(3601));
        let err = manager.validate(&issued.token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));

        // Expired row was removed; a second look is a plain not-found.
        let err = manager.validate(&issued.token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenNotFound));
    }

    #[tokio::test]
    async fn validate_does_not_extend_lifetime() {
        let (manager, clock) = manager();
        let issued = manager.issue(Uuid::new_v4()).await.unwrap();

        clock.advance(Duration::seconds(3000));
        manager.validate(&issued.token).await.unwrap();

        clock.advance(Duration::seconds(700));
        let err = manager.validate(&issued.token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let (manager, _clock) = manager();
        let err = manager.validate("never-issued").await.unwrap_err();
        assert!(matches!(err, AuthError::TokenNotFound));
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let (manager, _clock) = manager();
        let issued = manager.issue(Uuid::new_v4()).await.unwrap();

        manager.revoke(&issued.token).await.unwrap();
        manager.revoke(&issued.token).await.unwrap();

        let err = manager.validate(&issued.token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenNotFound));
    }
}
