//! One-time-code delivery seam.
//!
//! Dispatch is fire-and-forget from the auth core's perspective: a delivery
//! failure is logged by the caller and never rolls back the challenge that
//! produced the code, since the user can request a resend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::{Instrument, info_span};

#[async_trait]
pub trait CodeSender: Send + Sync {
    async fn send_one_time_code(&self, destination: &str, code: &str) -> Result<()>;
}

/// Queues codes on an `email_outbox` table for an external mailer worker
/// to drain.
pub struct OutboxCodeSender {
    pool: PgPool,
}

impl OutboxCodeSender {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CodeSender for OutboxCodeSender {
    async fn send_one_time_code(&self, destination: &str, code: &str) -> Result<()> {
        let payload = json!({
            "email": destination,
            "code": code,
        });
        let payload_text =
            serde_json::to_string(&payload).context("failed to serialize code payload")?;

        let query = r"
            INSERT INTO email_outbox (to_email, template, payload_json)
            VALUES ($1, $2, $3::jsonb)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(destination)
            .bind("one_time_code")
            .bind(payload_text)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert outbox row")?;
        Ok(())
    }
}

/// Captures sends in memory so tests can read the code back.
#[derive(Default)]
pub struct MemoryCodeSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl MemoryCodeSender {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }

    /// Most recent code dispatched to `destination`, if any.
    pub async fn last_code_for(&self, destination: &str) -> Option<String> {
        let sent = self.sent.lock().await;
        sent.iter()
            .rev()
            .find(|(dest, _)| dest == destination)
            .map(|(_, code)| code.clone())
    }
}

#[async_trait]
impl CodeSender for MemoryCodeSender {
    async fn send_one_time_code(&self, destination: &str, code: &str) -> Result<()> {
        let mut sent = self.sent.lock().await;
        sent.push((destination.to_string(), code.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_sender_captures_codes_in_order() -> Result<()> {
        let sender = MemoryCodeSender::new();
        sender.send_one_time_code("a@example.com", "111111").await?;
        sender.send_one_time_code("a@example.com", "222222").await?;
        sender.send_one_time_code("b@example.com", "333333").await?;

        assert_eq!(sender.sent().await.len(), 3);
        assert_eq!(
            sender.last_code_for("a@example.com").await.as_deref(),
            Some("222222")
        );
        assert_eq!(sender.last_code_for("missing@example.com").await, None);
        Ok(())
    }
}
