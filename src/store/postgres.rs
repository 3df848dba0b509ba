//! Postgres-backed stores.
//!
//! Straight `sqlx` queries with tracing spans, one struct over a pool.
//! The attempt table carries a `version` column so `update_if_version` is a
//! single guarded `UPDATE`; challenge consumption is one conditional
//! `DELETE ... RETURNING`. Schema lives in `db/schema.sql`.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::{
    AccountRole, AttemptRecord, AttemptStore, ChallengeConsume, ChallengeStore, CredentialRecord,
    CredentialStore, EmailChallengeRecord, MfaSecretRecord, MfaSecretStore, StoreResult,
    TokenRecord, TokenStore,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn credential_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<CredentialRecord> {
    let role_value: serde_json::Value = row.get("role");
    let role: AccountRole =
        serde_json::from_value(role_value).context("failed to decode account role")?;
    Ok(CredentialRecord {
        account_id: row.get("account_id"),
        identifier: row.get("identifier"),
        password_hash: row.get("password_hash"),
        expires_at: row.get("password_expires_at"),
        previous_hashes: row.get("previous_hashes"),
        role,
        email_code_enabled: row.get("email_code_enabled"),
    })
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_identifier(&self, identifier: &str) -> StoreResult<Option<CredentialRecord>> {
        let query = r"
            SELECT account_id, identifier, password_hash, password_expires_at,
                   previous_hashes, role, email_code_enabled
            FROM credentials
            WHERE identifier = $1
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", "credentials by identifier"))
            .await
            .context("failed to lookup credential")?;
        row.as_ref().map(credential_from_row).transpose()
    }

    async fn find_by_account(&self, account_id: Uuid) -> StoreResult<Option<CredentialRecord>> {
        let query = r"
            SELECT account_id, identifier, password_hash, password_expires_at,
                   previous_hashes, role, email_code_enabled
            FROM credentials
            WHERE account_id = $1
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", "credentials by account"))
            .await
            .context("failed to lookup credential by account")?;
        row.as_ref().map(credential_from_row).transpose()
    }
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn load(&self, ip: &str) -> StoreResult<Option<AttemptRecord>> {
        let query = r"
            SELECT failed_attempts, blocked, blocked_until, block_count,
                   last_attempt_at, version
            FROM login_attempts
            WHERE ip = $1
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(ip)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", "login_attempts by ip"))
            .await
            .context("failed to load attempt record")?;
        Ok(row.map(|row| AttemptRecord {
            failed_attempts: u32::try_from(row.get::<i32, _>("failed_attempts"))
                .unwrap_or_default(),
            blocked: row.get("blocked"),
            blocked_until: row.get("blocked_until"),
            block_count: u32::try_from(row.get::<i32, _>("block_count")).unwrap_or_default(),
            last_attempt_at: row.get("last_attempt_at"),
            version: row.get("version"),
        }))
    }

    async fn insert_if_absent(&self, ip: &str, record: AttemptRecord) -> StoreResult<bool> {
        let query = r"
            INSERT INTO login_attempts
                (ip, failed_attempts, blocked, blocked_until, block_count,
                 last_attempt_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (ip) DO NOTHING
        ";
        let result = sqlx::query(query)
            .bind(ip)
            .bind(i32::try_from(record.failed_attempts).unwrap_or(i32::MAX))
            .bind(record.blocked)
            .bind(record.blocked_until)
            .bind(i32::try_from(record.block_count).unwrap_or(i32::MAX))
            .bind(record.last_attempt_at)
            .bind(record.version)
            .execute(&self.pool)
            .instrument(query_span("INSERT", "login_attempts"))
            .await
            .context("failed to insert attempt record")?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_if_version(
        &self,
        ip: &str,
        record: AttemptRecord,
        expected_version: i64,
    ) -> StoreResult<bool> {
        let query = r"
            UPDATE login_attempts
            SET failed_attempts = $2,
                blocked = $3,
                blocked_until = $4,
                block_count = $5,
                last_attempt_at = $6,
                version = $7
            WHERE ip = $1
              AND version = $8
        ";
        let result = sqlx::query(query)
            .bind(ip)
            .bind(i32::try_from(record.failed_attempts).unwrap_or(i32::MAX))
            .bind(record.blocked)
            .bind(record.blocked_until)
            .bind(i32::try_from(record.block_count).unwrap_or(i32::MAX))
            .bind(record.last_attempt_at)
            .bind(record.version)
            .bind(expected_version)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", "login_attempts guarded by version"))
            .await
            .context("failed to update attempt record")?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert(&self, record: TokenRecord) -> StoreResult<bool> {
        let query = r"
            INSERT INTO session_tokens (token_hash, account_id, issued_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (token_hash) DO NOTHING
        ";
        let result = sqlx::query(query)
            .bind(&record.token_hash)
            .bind(record.account_id)
            .bind(record.issued_at)
            .bind(record.expires_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", "session_tokens"))
            .await
            .context("failed to insert session token")?;
        Ok(result.rows_affected() == 1)
    }

    async fn load(&self, token_hash: &[u8]) -> StoreResult<Option<TokenRecord>> {
        let query = r"
            SELECT token_hash, account_id, issued_at, expires_at
            FROM session_tokens
            WHERE token_hash = $1
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", "session_tokens by hash"))
            .await
            .context("failed to lookup session token")?;
        Ok(row.map(|row| TokenRecord {
            token_hash: row.get("token_hash"),
            account_id: row.get("account_id"),
            issued_at: row.get("issued_at"),
            expires_at: row.get("expires_at"),
        }))
    }

    async fn delete(&self, token_hash: &[u8]) -> StoreResult<()> {
        // Idempotent; zero rows deleted is fine.
        let query = "DELETE FROM session_tokens WHERE token_hash = $1";
        sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(query_span("DELETE", "session_tokens"))
            .await
            .context("failed to delete session token")?;
        Ok(())
    }
}

#[async_trait]
impl MfaSecretStore for PgStore {
    async fn load(&self, account_id: Uuid) -> StoreResult<Option<MfaSecretRecord>> {
        let query = r"
            SELECT account_id, secret, enabled
            FROM mfa_secrets
            WHERE account_id = $1
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", "mfa_secrets by account"))
            .await
            .context("failed to load mfa secret")?;
        Ok(row.map(|row| MfaSecretRecord {
            account_id: row.get("account_id"),
            secret: row.get("secret"),
            enabled: row.get("enabled"),
        }))
    }

    async fn upsert(&self, record: MfaSecretRecord) -> StoreResult<()> {
        let query = r"
            INSERT INTO mfa_secrets (account_id, secret, enabled, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (account_id) DO UPDATE
            SET secret = $2,
                enabled = $3,
                updated_at = NOW()
        ";
        sqlx::query(query)
            .bind(record.account_id)
            .bind(&record.secret)
            .bind(record.enabled)
            .execute(&self.pool)
            .instrument(query_span("INSERT", "mfa_secrets upsert"))
            .await
            .context("failed to upsert mfa secret")?;
        Ok(())
    }
}

#[async_trait]
impl ChallengeStore for PgStore {
    async fn insert(&self, record: EmailChallengeRecord) -> StoreResult<()> {
        let query = r"
            INSERT INTO email_challenges (id, account_id, code_hash, issued_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
        ";
        sqlx::query(query)
            .bind(record.id)
            .bind(record.account_id)
            .bind(&record.code_hash)
            .bind(record.issued_at)
            .bind(record.expires_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", "email_challenges"))
            .await
            .context("failed to insert email challenge")?;
        Ok(())
    }

    async fn consume(
        &self,
        id: Uuid,
        code_hash: &[u8],
        now: DateTime<Utc>,
    ) -> StoreResult<ChallengeConsume> {
        // Matching and expired rows are removed in one statement, so two
        // concurrent callers cannot both consume the code.
        let query = r"
            DELETE FROM email_challenges
            WHERE id = $1
              AND (expires_at <= $2 OR code_hash = $3)
            RETURNING account_id, code_hash, issued_at, expires_at
        ";
        let row = sqlx::query(query)
            .bind(id)
            .bind(now)
            .bind(code_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("DELETE", "email_challenges conditional consume"))
            .await
            .context("failed to consume email challenge")?;

        if let Some(row) = row {
            let expires_at: DateTime<Utc> = row.get("expires_at");
            if expires_at <= now {
                return Ok(ChallengeConsume::Expired);
            }
            return Ok(ChallengeConsume::Consumed(EmailChallengeRecord {
                id,
                account_id: row.get("account_id"),
                code_hash: row.get("code_hash"),
                issued_at: row.get("issued_at"),
                expires_at,
            }));
        }

        // Nothing deleted: either the challenge is gone or the code was
        // wrong for a live challenge. Mismatch needs no atomicity since
        // nothing was consumed.
        let query = "SELECT 1 FROM email_challenges WHERE id = $1 LIMIT 1";
        let exists = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", "email_challenges existence"))
            .await
            .context("failed to check email challenge")?;
        if exists.is_some() {
            Ok(ChallengeConsume::Mismatch)
        } else {
            Ok(ChallengeConsume::NotFound)
        }
    }
}
