//! Expiry sweeping of time-boxed policies.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fwsync_core::{LogCategory, OperationLog, OperationLogEntry, Policy, PolicyStore};
use tracing::{error, info};

use crate::error::EngineError;
use crate::retry::{ConflictRetry, delete_with_retry};

/// Counts from one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Expired policies found.
    pub examined: usize,
    pub deleted: usize,
    /// Deletions that failed after exhausting conflict retries.
    pub failed: usize,
}

/// Deletes policies whose derived expiry has passed and records why.
///
/// Runs on its own cadence, independent of collection cycles. It only
/// touches time-boxed policies and the reconciler only touches unlimited
/// ones, so the two never contend for the same rows.
pub struct ExpirySweeper<S, L> {
    store: Arc<S>,
    log: Arc<L>,
    retry: ConflictRetry,
}

impl<S: PolicyStore, L: OperationLog> ExpirySweeper<S, L> {
    pub fn new(store: Arc<S>, log: Arc<L>) -> Self {
        Self { store, log, retry: ConflictRetry::default() }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: ConflictRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Finds and removes every policy expired at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] only when the expired-policy listing itself
    /// fails; individual deletion failures are counted and logged, and the
    /// sweep carries on.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepOutcome, EngineError> {
        let expired = self.store.expired_policies(now).await?;
        let mut outcome = SweepOutcome { examined: expired.len(), ..SweepOutcome::default() };
        if expired.is_empty() {
            info!("no expired policies");
            return Ok(outcome);
        }

        info!(count = expired.len(), "expired policies found");
        for policy in &expired {
            match delete_with_retry(self.store.as_ref(), self.retry, policy).await {
                Ok(true) => {
                    info!(
                        policy = %policy.id,
                        agent_id = %policy.agent_id,
                        expired_at = ?policy.expires_at(),
                        "expired policy deleted"
                    );
                    self.log
                        .record(OperationLogEntry::system(
                            LogCategory::Policy,
                            "policy expired",
                            describe_expired(policy),
                            now,
                        ))
                        .await;
                    outcome.deleted += 1;
                }
                Ok(false) => {
                    // Already gone; nothing to record.
                }
                Err(err) => {
                    outcome.failed += 1;
                    error!(policy = %policy.id, error = %err, "failed to delete expired policy");
                }
            }
        }

        info!(deleted = outcome.deleted, failed = outcome.failed, "expiry sweep finished");
        Ok(outcome)
    }
}

/// Enough detail to explain the removal after the fact.
fn describe_expired(policy: &Policy) -> String {
    let expired_at = policy
        .expires_at()
        .map_or_else(|| "unknown".to_string(), |at| at.to_rfc3339());
    format!(
        "policy {}: agent={}, priority={}, source={}, protocol={}, port={}, action={}, expired_at={}",
        policy.id,
        policy.agent_id,
        policy.priority,
        policy.source,
        policy.protocol.as_str(),
        policy.port,
        policy.action.as_str(),
        expired_at,
    )
}
