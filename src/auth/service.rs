//! Login orchestration.
//!
//! One state machine per attempt: rate-limit gate, credential lookup,
//! password check, then factor routing. Every security-relevant outcome is
//! a value; nothing here retries, and nothing in a response or log line
//! distinguishes an unknown identifier from a wrong password.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::auth::lockout::IpAttemptTracker;
use crate::auth::mfa::MfaChallengeService;
use crate::auth::token::TokenManager;
use crate::auth::types::{BlockStatus, LoginOutcome, SessionToken, TotpEnrollment};
use crate::auth::utils::normalize_identifier;
use crate::clock::Clock;
use crate::password::PasswordVerifier;
use crate::store::{CredentialRecord, CredentialStore};

pub struct AuthenticationService {
    credentials: Arc<dyn CredentialStore>,
    verifier: Arc<dyn PasswordVerifier>,
    tracker: IpAttemptTracker,
    tokens: TokenManager,
    mfa: MfaChallengeService,
    clock: Arc<dyn Clock>,
}

impl AuthenticationService {
    #[must_use]
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        verifier: Arc<dyn PasswordVerifier>,
        tracker: IpAttemptTracker,
        tokens: TokenManager,
        mfa: MfaChallengeService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            verifier,
            tracker,
            tokens,
            mfa,
            clock,
        }
    }

    /// Run one login attempt for `(identifier, password, client_ip)`.
    ///
    /// Terminal for the attempt: the caller decides whether and when to
    /// retry. Rate limits and bad credentials come back as `AuthError`
    /// values, never as panics or logged identifier detail.
    pub async fn login(
        &self,
        identifier: &str,
        password: &SecretString,
        client_ip: &str,
    ) -> Result<LoginOutcome, AuthError> {
        if let BlockStatus::Blocked { until } = self.tracker.is_currently_blocked(client_ip).await?
        {
            warn!(%client_ip, permanent = until.is_none(), "login rejected: ip blocked");
            return Err(AuthError::RateLimited {
                retry_after: until.map(|t| self.remaining(t)),
            });
        }

        let identifier = normalize_identifier(identifier);
        let credential = self
            .credentials
            .find_by_identifier(&identifier)
            .await
            .map_err(AuthError::unavailable)?;

        // Unknown identifier and wrong password share one path so response
        // behavior cannot leak account existence.
        let Some(credential) = credential else {
            self.failed_attempt(client_ip).await?;
            return Err(AuthError::InvalidCredentials);
        };
        if !self.verifier.verify(password, &credential.password_hash) {
            self.failed_attempt(client_ip).await?;
            return Err(AuthError::InvalidCredentials);
        }

        self.tracker.reset_on_success(client_ip).await?;

        if self.password_expired(&credential) {
            info!(account_id = %credential.account_id, "password accepted but expired");
            return Ok(LoginOutcome::PasswordExpired {
                account_id: credential.account_id,
            });
        }

        if self.mfa.totp_enabled(credential.account_id).await? {
            return Ok(LoginOutcome::SecondFactorRequired {
                account_id: credential.account_id,
            });
        }

        if credential.email_code_enabled {
            let challenge_id = self
                .mfa
                .issue_email_challenge(credential.account_id, &credential.identifier)
                .await?;
            return Ok(LoginOutcome::ThirdFactorRequired { challenge_id });
        }

        let token = self.tokens.issue(credential.account_id).await?;
        Ok(LoginOutcome::Granted { token })
    }

    /// Complete a `SecondFactorRequired` login with a TOTP code.
    pub async fn verify_second_factor(
        &self,
        account_id: Uuid,
        code: &str,
    ) -> Result<SessionToken, AuthError> {
        if self.mfa.verify_totp_code(account_id, code).await? {
            self.tokens.issue(account_id).await
        } else {
            Err(AuthError::ChallengeMismatch)
        }
    }

    /// Complete a `ThirdFactorRequired` login with the emailed code.
    pub async fn verify_third_factor(
        &self,
        challenge_id: Uuid,
        code: &str,
    ) -> Result<SessionToken, AuthError> {
        let account_id = self.mfa.verify_email_challenge(challenge_id, code).await?;
        self.tokens.issue(account_id).await
    }

    /// Resolve a bearer token on a subsequent request.
    pub async fn validate_token(&self, token: &str) -> Result<Uuid, AuthError> {
        self.tokens.validate(token).await
    }

    /// Revoke a session. Idempotent.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.tokens.revoke(token).await
    }

    /// Begin TOTP enrollment for an authenticated account.
    pub async fn enroll_second_factor(
        &self,
        account_id: Uuid,
    ) -> Result<TotpEnrollment, AuthError> {
        let credential = self
            .credentials
            .find_by_account(account_id)
            .await
            .map_err(AuthError::unavailable)?
            .ok_or_else(|| {
                // Enrollment is only reachable for authenticated accounts;
                // a missing credential row is a store inconsistency.
                AuthError::unavailable(anyhow::anyhow!("no credential for account {account_id}"))
            })?;
        self.mfa
            .enroll_totp(account_id, &credential.identifier)
            .await
    }

    async fn failed_attempt(&self, client_ip: &str) -> Result<(), AuthError> {
        self.tracker.record_failure(client_ip).await?;
        self.tracker.evaluate_and_maybe_block(client_ip).await?;
        info!(%client_ip, "login failed: invalid credentials");
        Ok(())
    }

    fn password_expired(&self, credential: &CredentialRecord) -> bool {
        credential
            .expires_at
            .is_some_and(|expires_at| expires_at <= self.clock.now())
    }

    fn remaining(&self, until: DateTime<Utc>) -> std::time::Duration {
        (until - self.clock.now()).to_std().unwrap_or_default()
    }
}
