//! Second and third factor challenges.
//!
//! The second factor is TOTP: a shared secret provisioned at enrollment,
//! kept disabled until the user proves possession with a first valid code.
//! The third factor is an emailed numeric one-time code with a fixed expiry,
//! consumed atomically on verification.
//!
//! A verified TOTP code is accepted again within its validity window; with
//! a 30 second step, one-step skew, and the lockout tracker in front of the
//! login flow, persisting a last-used counter buys little for the extra
//! write per verification.

use anyhow::anyhow;
use chrono::Duration;
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::auth::types::TotpEnrollment;
use crate::auth::utils::{generate_numeric_code, hash_code};
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::delivery::CodeSender;
use crate::store::{
    ChallengeConsume, ChallengeStore, EmailChallengeRecord, MfaSecretRecord, MfaSecretStore,
};

const TOTP_DIGITS: usize = 6;
const TOTP_STEP_SECONDS: u64 = 30;
/// Steps of clock skew tolerated either side of now.
const TOTP_SKEW: u8 = 1;

pub struct MfaChallengeService {
    secrets: Arc<dyn MfaSecretStore>,
    challenges: Arc<dyn ChallengeStore>,
    sender: Arc<dyn CodeSender>,
    clock: Arc<dyn Clock>,
    issuer: String,
    challenge_ttl: Duration,
}

impl MfaChallengeService {
    #[must_use]
    pub fn new(
        secrets: Arc<dyn MfaSecretStore>,
        challenges: Arc<dyn ChallengeStore>,
        sender: Arc<dyn CodeSender>,
        clock: Arc<dyn Clock>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            secrets,
            challenges,
            sender,
            clock,
            issuer: config.totp_issuer().to_string(),
            challenge_ttl: Duration::seconds(config.email_challenge_ttl_seconds()),
        }
    }

    /// Provision a fresh TOTP secret for `account_id`, stored disabled
    /// until the first successful verification. Re-enrolling replaces any
    /// prior secret. The `identifier` only labels the provisioning URI.
    pub async fn enroll_totp(
        &self,
        account_id: Uuid,
        identifier: &str,
    ) -> Result<TotpEnrollment, AuthError> {
        let secret_bytes = Secret::generate_secret()
            .to_bytes()
            .map_err(|e| AuthError::unavailable(anyhow!("secret generation failed: {e}")))?;

        self.secrets
            .upsert(MfaSecretRecord {
                account_id,
                secret: secret_bytes.clone(),
                enabled: false,
            })
            .await
            .map_err(AuthError::unavailable)?;

        let totp = self.totp_instance(secret_bytes, identifier)?;
        info!(%account_id, "totp enrollment started");
        Ok(TotpEnrollment {
            secret_base32: totp.get_secret_base32(),
            provisioning_uri: totp.get_url(),
        })
    }

    /// Check a time-stepped code against the stored secret, tolerating one
    /// step of clock skew. The first success during enrollment flips the
    /// secret to enabled. Returns false when no secret is provisioned.
    pub async fn verify_totp_code(&self, account_id: Uuid, code: &str) -> Result<bool, AuthError> {
        let Some(record) = self
            .secrets
            .load(account_id)
            .await
            .map_err(AuthError::unavailable)?
        else {
            return Ok(false);
        };

        let totp = self.totp_instance(record.secret.clone(), "account")?;
        let timestamp = u64::try_from(self.clock.now().timestamp()).unwrap_or(0);
        let valid = totp.check(code, timestamp);

        if valid && !record.enabled {
            // Enrollment confirmed: possession proven.
            self.secrets
                .upsert(MfaSecretRecord {
                    enabled: true,
                    ..record
                })
                .await
                .map_err(AuthError::unavailable)?;
            info!(%account_id, "totp enrollment confirmed");
        }
        Ok(valid)
    }

    /// Whether the account has a confirmed TOTP secret.
    pub async fn totp_enabled(&self, account_id: Uuid) -> Result<bool, AuthError> {
        let record = self
            .secrets
            .load(account_id)
            .await
            .map_err(AuthError::unavailable)?;
        Ok(record.is_some_and(|record| record.enabled))
    }

    /// Create an email challenge and hand the code to the delivery
    /// collaborator. Dispatch failures are logged, not propagated: the
    /// challenge stands and the user can request a resend.
    pub async fn issue_email_challenge(
        &self,
        account_id: Uuid,
        destination: &str,
    ) -> Result<Uuid, AuthError> {
        let now = self.clock.now();
        let code = generate_numeric_code();
        let record = EmailChallengeRecord {
            id: Uuid::new_v4(),
            account_id,
            code_hash: hash_code(&code),
            issued_at: now,
            expires_at: now + self.challenge_ttl,
        };
        let challenge_id = record.id;

        self.challenges
            .insert(record)
            .await
            .map_err(AuthError::unavailable)?;

        if let Err(err) = self.sender.send_one_time_code(destination, &code).await {
            warn!(%challenge_id, "one-time code dispatch failed: {err}");
        }
        info!(%account_id, %challenge_id, "email challenge issued");
        Ok(challenge_id)
    }

    /// Verify-and-consume an email challenge. On a match the challenge is
    /// gone and the owning account id is returned for token issuance; a
    /// mismatch leaves the challenge in place for another try.
    pub async fn verify_email_challenge(
        &self,
        challenge_id: Uuid,
        code: &str,
    ) -> Result<Uuid, AuthError> {
        let outcome = self
            .challenges
            .consume(challenge_id, &hash_code(code), self.clock.now())
            .await
            .map_err(AuthError::unavailable)?;

        match outcome {
            ChallengeConsume::Consumed(record) => {
                info!(%challenge_id, "email challenge verified");
                Ok(record.account_id)
            }
            ChallengeConsume::Expired => Err(AuthError::ChallengeExpired),
            ChallengeConsume::Mismatch => Err(AuthError::ChallengeMismatch),
            ChallengeConsume::NotFound => Err(AuthError::ChallengeNotFound),
        }
    }

    fn totp_instance(&self, secret: Vec<u8>, label: &str) -> Result<TOTP, AuthError> {
        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP_SECONDS,
            secret,
            Some(self.issuer.clone()),
            label.to_string(),
        )
        .map_err(|e| AuthError::unavailable(anyhow!("totp init failed: {e}")))
    }
}
