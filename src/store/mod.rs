//! Persistence seams for the auth core.
//!
//! Each record family gets its own trait so an embedding service can back
//! them independently. The operations are semantic, not generic key-value:
//! the attempt store exposes a version-guarded compare-and-swap (the
//! tracker's read-modify-write sequences retry on conflict), the token
//! store a unique insert, and the challenge store a single atomic consume.
//! Store failures are `anyhow` errors; the auth layer wraps them in its
//! distinct unavailable category.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type StoreResult<T> = anyhow::Result<T>;

/// Role tag plus role-specific payload, selected by matching rather than
/// runtime type inspection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum AccountRole {
    Listener,
    Curator(CuratorProfile),
    Operator(OperatorProfile),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuratorProfile {
    /// Curators may only touch catalogs they own.
    pub owned_catalogs: Vec<Uuid>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorProfile {
    pub support_contact: String,
}

impl AccountRole {
    #[must_use]
    pub fn can_manage_catalog(&self, catalog_id: Uuid) -> bool {
        match self {
            Self::Listener => false,
            Self::Curator(profile) => profile.owned_catalogs.contains(&catalog_id),
            Self::Operator(_) => true,
        }
    }
}

/// A stored credential. Mutated only by the account system (password
/// change, role change); this crate reads it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialRecord {
    pub account_id: Uuid,
    /// Normalized (trimmed, lowercased) login identifier; also the
    /// destination for email one-time codes.
    pub identifier: String,
    /// PHC-format password hash. Opaque to this crate.
    pub password_hash: String,
    /// Past this instant the password is accepted once but must be changed.
    pub expires_at: Option<DateTime<Utc>>,
    /// Prior hashes; reuse rejection happens in the password-change flow.
    pub previous_hashes: Vec<String>,
    pub role: AccountRole,
    /// Whether the emailed one-time code (third factor) is enabled.
    pub email_code_enabled: bool,
}

/// Per-IP lockout state. `blocked` with `blocked_until == None` is the
/// permanent sentinel. `version` guards every read-modify-write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptRecord {
    pub failed_attempts: u32,
    pub blocked: bool,
    pub blocked_until: Option<DateTime<Utc>>,
    pub block_count: u32,
    pub last_attempt_at: DateTime<Utc>,
    pub version: i64,
}

impl AttemptRecord {
    /// Fresh record for an IP seen for the first time.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            failed_attempts: 0,
            blocked: false,
            blocked_until: None,
            block_count: 0,
            last_attempt_at: now,
            version: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRecord {
    pub token_hash: Vec<u8>,
    pub account_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MfaSecretRecord {
    pub account_id: Uuid,
    pub secret: Vec<u8>,
    /// Stays false until the first successful verification at enrollment.
    pub enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailChallengeRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub code_hash: Vec<u8>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of the atomic challenge consume.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChallengeConsume {
    /// Code matched before expiry; the challenge is gone.
    Consumed(EmailChallengeRecord),
    /// Expiry had passed; the challenge was deleted as a side effect.
    Expired,
    /// Wrong code; the challenge remains for another try.
    Mismatch,
    NotFound,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_identifier(&self, identifier: &str) -> StoreResult<Option<CredentialRecord>>;
    async fn find_by_account(&self, account_id: Uuid) -> StoreResult<Option<CredentialRecord>>;
}

#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn load(&self, ip: &str) -> StoreResult<Option<AttemptRecord>>;

    /// Returns false when a record for `ip` already exists.
    async fn insert_if_absent(&self, ip: &str, record: AttemptRecord) -> StoreResult<bool>;

    /// Writes `record` only if the stored version still equals
    /// `expected_version`. Returns false on conflict so callers can retry.
    async fn update_if_version(
        &self,
        ip: &str,
        record: AttemptRecord,
        expected_version: i64,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Unique-key insert; returns false on a token-hash collision.
    async fn insert(&self, record: TokenRecord) -> StoreResult<bool>;
    async fn load(&self, token_hash: &[u8]) -> StoreResult<Option<TokenRecord>>;
    /// Idempotent.
    async fn delete(&self, token_hash: &[u8]) -> StoreResult<()>;
}

#[async_trait]
pub trait MfaSecretStore: Send + Sync {
    async fn load(&self, account_id: Uuid) -> StoreResult<Option<MfaSecretRecord>>;
    async fn upsert(&self, record: MfaSecretRecord) -> StoreResult<()>;
}

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn insert(&self, record: EmailChallengeRecord) -> StoreResult<()>;

    /// Verification and deletion as one conditional step, so a code can
    /// never be accepted twice by concurrent callers.
    async fn consume(
        &self,
        id: Uuid,
        code_hash: &[u8],
        now: DateTime<Utc>,
    ) -> StoreResult<ChallengeConsume>;
}
