//! Bounded retry for version-conflicted store writes.
//!
//! Optimistic concurrency is the store's only contention-management
//! mechanism, so conflicting writers retry: attempt the write, on a
//! version conflict re-read the row, recompute, and try again with
//! exponential backoff. Exhausting the budget yields a typed failure,
//! never a crash.

use std::time::Duration;

use fwsync_core::{Policy, PolicyStore, StoreError};
use tokio::time::sleep;

use crate::error::EngineError;

/// Upper bound on a single backoff pause.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Retry budget for conflicted writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictRetry {
    /// Total attempts, the initial write included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_backoff: Duration,
    /// Backoff growth factor per retry.
    pub multiplier: u32,
}

impl Default for ConflictRetry {
    fn default() -> Self {
        Self { max_attempts: 3, base_backoff: Duration::from_millis(500), multiplier: 2 }
    }
}

impl ConflictRetry {
    /// Backoff before retry number `attempt` (0-indexed).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt);
        self.base_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Updates a policy's priority, absorbing version conflicts by re-reading
/// the row and retrying within the budget.
pub(crate) async fn update_priority_with_retry<S: PolicyStore + ?Sized>(
    store: &S,
    retry: ConflictRetry,
    policy: &Policy,
    priority: i32,
) -> Result<(), EngineError> {
    let mut current = policy.clone();
    for attempt in 0..retry.max_attempts {
        match store.update_priority(current.id, current.version, priority).await {
            Ok(_) => return Ok(()),
            Err(err) if err.is_conflict() => {
                if attempt + 1 == retry.max_attempts {
                    return Err(EngineError::RetriesExhausted {
                        id: current.id,
                        attempts: retry.max_attempts,
                    });
                }
                sleep(retry.backoff(attempt)).await;
                match store.policy(current.id).await {
                    Ok(fresh) => {
                        // Another writer may have landed the same value.
                        if fresh.priority == priority {
                            return Ok(());
                        }
                        current = fresh;
                    }
                    // Row vanished under us; nothing left to update.
                    Err(StoreError::NotFound { .. }) => return Ok(()),
                    Err(err) => return Err(err.into()),
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(EngineError::RetriesExhausted { id: policy.id, attempts: retry.max_attempts })
}

/// Deletes a policy, absorbing version conflicts the same way. Returns
/// `false` when the row was already gone.
pub(crate) async fn delete_with_retry<S: PolicyStore + ?Sized>(
    store: &S,
    retry: ConflictRetry,
    policy: &Policy,
) -> Result<bool, EngineError> {
    let mut current = policy.clone();
    for attempt in 0..retry.max_attempts {
        match store.delete_policy(current.id, current.version).await {
            Ok(()) => return Ok(true),
            Err(StoreError::NotFound { .. }) => return Ok(false),
            Err(err) if err.is_conflict() => {
                if attempt + 1 == retry.max_attempts {
                    return Err(EngineError::RetriesExhausted {
                        id: current.id,
                        attempts: retry.max_attempts,
                    });
                }
                sleep(retry.backoff(attempt)).await;
                match store.policy(current.id).await {
                    Ok(fresh) => current = fresh,
                    Err(StoreError::NotFound { .. }) => return Ok(false),
                    Err(err) => return Err(err.into()),
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(EngineError::RetriesExhausted { id: policy.id, attempts: retry.max_attempts })
}
