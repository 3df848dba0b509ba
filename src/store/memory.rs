//! In-process store backed by mutex-guarded maps.
//!
//! Each record family sits behind its own lock, so every trait operation is
//! atomic per key. This is the store the test suites wire up; it is also
//! usable for single-process deployments that can afford to lose lockout
//! state on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    AttemptRecord, AttemptStore, ChallengeConsume, ChallengeStore, CredentialRecord,
    CredentialStore, EmailChallengeRecord, MfaSecretRecord, MfaSecretStore, StoreResult,
    TokenRecord, TokenStore,
};

#[derive(Default)]
pub struct MemoryStore {
    credentials: Mutex<HashMap<String, CredentialRecord>>,
    attempts: Mutex<HashMap<String, AttemptRecord>>,
    tokens: Mutex<HashMap<Vec<u8>, TokenRecord>>,
    secrets: Mutex<HashMap<Uuid, MfaSecretRecord>>,
    challenges: Mutex<HashMap<Uuid, EmailChallengeRecord>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace a credential. Account provisioning lives outside the
    /// auth core; tests and embedders use this to populate the store.
    pub async fn upsert_credential(&self, record: CredentialRecord) {
        let mut credentials = self.credentials.lock().await;
        credentials.insert(record.identifier.clone(), record);
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_identifier(&self, identifier: &str) -> StoreResult<Option<CredentialRecord>> {
        let credentials = self.credentials.lock().await;
        Ok(credentials.get(identifier).cloned())
    }

    async fn find_by_account(&self, account_id: Uuid) -> StoreResult<Option<CredentialRecord>> {
        let credentials = self.credentials.lock().await;
        Ok(credentials
            .values()
            .find(|record| record.account_id == account_id)
            .cloned())
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn load(&self, ip: &str) -> StoreResult<Option<AttemptRecord>> {
        let attempts = self.attempts.lock().await;
        Ok(attempts.get(ip).cloned())
    }

    async fn insert_if_absent(&self, ip: &str, record: AttemptRecord) -> StoreResult<bool> {
        let mut attempts = self.attempts.lock().await;
        if attempts.contains_key(ip) {
            return Ok(false);
        }
        attempts.insert(ip.to_string(), record);
        Ok(true)
    }

    async fn update_if_version(
        &self,
        ip: &str,
        record: AttemptRecord,
        expected_version: i64,
    ) -> StoreResult<bool> {
        let mut attempts = self.attempts.lock().await;
        match attempts.get_mut(ip) {
            Some(current) if current.version == expected_version => {
                *current = record;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert(&self, record: TokenRecord) -> StoreResult<bool> {
        let mut tokens = self.tokens.lock().await;
        if tokens.contains_key(&record.token_hash) {
            return Ok(false);
        }
        tokens.insert(record.token_hash.clone(), record);
        Ok(true)
    }

    async fn load(&self, token_hash: &[u8]) -> StoreResult<Option<TokenRecord>> {
        let tokens = self.tokens.lock().await;
        Ok(tokens.get(token_hash).cloned())
    }

    async fn delete(&self, token_hash: &[u8]) -> StoreResult<()> {
        let mut tokens = self.tokens.lock().await;
        tokens.remove(token_hash);
        Ok(())
    }
}

#[async_trait]
impl MfaSecretStore for MemoryStore {
    async fn load(&self, account_id: Uuid) -> StoreResult<Option<MfaSecretRecord>> {
        let secrets = self.secrets.lock().await;
        Ok(secrets.get(&account_id).cloned())
    }

    async fn upsert(&self, record: MfaSecretRecord) -> StoreResult<()> {
        let mut secrets = self.secrets.lock().await;
        secrets.insert(record.account_id, record);
        Ok(())
    }
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn insert(&self, record: EmailChallengeRecord) -> StoreResult<()> {
        let mut challenges = self.challenges.lock().await;
        challenges.insert(record.id, record);
        Ok(())
    }

    async fn consume(
        &self,
        id: Uuid,
        code_hash: &[u8],
        now: DateTime<Utc>,
    ) -> StoreResult<ChallengeConsume> {
        let mut challenges = self.challenges.lock().await;
        let Some(record) = challenges.remove(&id) else {
            return Ok(ChallengeConsume::NotFound);
        };
        if record.expires_at <= now {
            // Deleted on expiry detection; the entry stays removed.
            return Ok(ChallengeConsume::Expired);
        }
        if record.code_hash != code_hash {
            challenges.insert(id, record);
            return Ok(ChallengeConsume::Mismatch);
        }
        Ok(ChallengeConsume::Consumed(record))
    }
}
