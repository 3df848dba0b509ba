//! Progressive per-IP lockout.
//!
//! Flow Overview:
//! 1) Every failed login bumps the IP's failure counter.
//! 2) At 5 failures the record transitions into a block; the duration
//!    escalates with each block the IP has earned (15 s, 1 min, 15 min,
//!    then permanent).
//! 3) Temporary blocks clear lazily the next time the IP is checked, but
//!    the escalation level survives so repeat offenders climb the ladder.
//! 4) One successful authentication forgives everything, escalation
//!    level included.
//!
//! All read-modify-write sequences run as optimistic compare-and-swap
//! retry loops against the attempt store's version field; concurrent
//! attempts from one IP cannot lose a block to a torn increment.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::error::AuthError;
use crate::auth::types::BlockStatus;
use crate::clock::Clock;
use crate::store::{AttemptRecord, AttemptStore};

/// Failures per cycle before a block is applied.
pub const FAILURE_THRESHOLD: u32 = 5;

/// Bounded retries for CAS conflicts before giving up on the store.
const CAS_RETRIES: u32 = 8;

/// Block duration for the given escalation level (the level *after* the
/// increment). `None` means permanent.
fn block_duration(block_count: u32) -> Option<Duration> {
    match block_count {
        0 | 1 => Some(Duration::seconds(15)),
        2 => Some(Duration::minutes(1)),
        3 => Some(Duration::minutes(15)),
        _ => None,
    }
}

pub struct IpAttemptTracker {
    store: Arc<dyn AttemptStore>,
    clock: Arc<dyn Clock>,
}

impl IpAttemptTracker {
    #[must_use]
    pub fn new(store: Arc<dyn AttemptStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Count a failed attempt from `ip`, creating the record on first sight.
    pub async fn record_failure(&self, ip: &str) -> Result<(), AuthError> {
        let now = self.clock.now();
        for _ in 0..CAS_RETRIES {
            match self.load(ip).await? {
                None => {
                    let mut record = AttemptRecord::new(now);
                    record.failed_attempts = 1;
                    if self.insert(ip, record).await? {
                        return Ok(());
                    }
                }
                Some(mut record) => {
                    let expected = record.version;
                    record.failed_attempts += 1;
                    record.last_attempt_at = now;
                    record.version += 1;
                    if self.update(ip, record, expected).await? {
                        return Ok(());
                    }
                }
            }
        }
        Err(contention(ip))
    }

    /// Transition the record into a block when the failure counter has
    /// reached the threshold. Returns true iff a block was just applied.
    pub async fn evaluate_and_maybe_block(&self, ip: &str) -> Result<bool, AuthError> {
        let now = self.clock.now();
        for _ in 0..CAS_RETRIES {
            let Some(mut record) = self.load(ip).await? else {
                return Ok(false);
            };
            if record.failed_attempts < FAILURE_THRESHOLD {
                return Ok(false);
            }

            let expected = record.version;
            record.block_count += 1;
            record.failed_attempts = 0;
            record.blocked = true;
            record.blocked_until = block_duration(record.block_count).map(|d| now + d);
            record.version += 1;

            let block_count = record.block_count;
            let blocked_until = record.blocked_until;
            if self.update(ip, record, expected).await? {
                match blocked_until {
                    Some(until) => {
                        warn!(client_ip = %ip, block_count, until = %until, "ip blocked")
                    }
                    None => warn!(client_ip = %ip, block_count, "ip blocked permanently"),
                }
                return Ok(true);
            }
        }
        Err(contention(ip))
    }

    /// Whether `ip` is inside a block window right now.
    ///
    /// This is a command-query-with-side-effect: an expired temporary block
    /// is cleared here, lazily, keeping the escalation level. Calling it
    /// again after the expiry has been processed is a plain read.
    pub async fn is_currently_blocked(&self, ip: &str) -> Result<BlockStatus, AuthError> {
        let now = self.clock.now();
        for _ in 0..CAS_RETRIES {
            let Some(mut record) = self.load(ip).await? else {
                return Ok(BlockStatus::Clear);
            };
            if !record.blocked {
                return Ok(BlockStatus::Clear);
            }
            let Some(until) = record.blocked_until else {
                return Ok(BlockStatus::Blocked { until: None });
            };
            if until > now {
                return Ok(BlockStatus::Blocked { until: Some(until) });
            }

            // Expired: materialize the unblock. block_count survives so the
            // next block escalates.
            let expected = record.version;
            record.blocked = false;
            record.blocked_until = None;
            record.failed_attempts = 0;
            record.version += 1;
            if self.update(ip, record, expected).await? {
                debug!(client_ip = %ip, "expired block cleared");
                return Ok(BlockStatus::Clear);
            }
        }
        Err(contention(ip))
    }

    /// A successful authentication forgives the IP entirely, escalation
    /// level included.
    pub async fn reset_on_success(&self, ip: &str) -> Result<(), AuthError> {
        let now = self.clock.now();
        for _ in 0..CAS_RETRIES {
            let Some(record) = self.load(ip).await? else {
                return Ok(());
            };
            let expected = record.version;
            let reset = AttemptRecord {
                failed_attempts: 0,
                blocked: false,
                blocked_until: None,
                block_count: 0,
                last_attempt_at: now,
                version: record.version + 1,
            };
            if self.update(ip, reset, expected).await? {
                return Ok(());
            }
        }
        Err(contention(ip))
    }

    async fn load(&self, ip: &str) -> Result<Option<AttemptRecord>, AuthError> {
        self.store.load(ip).await.map_err(AuthError::unavailable)
    }

    async fn insert(&self, ip: &str, record: AttemptRecord) -> Result<bool, AuthError> {
        self.store
            .insert_if_absent(ip, record)
            .await
            .map_err(AuthError::unavailable)
    }

    async fn update(
        &self,
        ip: &str,
        record: AttemptRecord,
        expected: i64,
    ) -> Result<bool, AuthError> {
        self.store
            .update_if_version(ip, record, expected)
            .await
            .map_err(AuthError::unavailable)
    }
}

fn contention(ip: &str) -> AuthError {
    AuthError::unavailable(anyhow::anyhow!(
        "attempt record for {ip} contended beyond retry budget"
    ))
}
