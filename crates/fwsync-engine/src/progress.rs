//! Per-agent in-progress registry.
//!
//! Two overlapping cycles must never reconcile the same agent
//! concurrently. An agent is claimed before its work starts and released
//! by an RAII guard, so the flag clears on every exit path: success,
//! failure, panic, or a cycle deadline that abandoned the task in place
//! (in which case the still-running task keeps the claim until it
//! actually finishes).

use std::collections::HashSet;
use std::sync::Arc;

use fwsync_core::AgentId;
use parking_lot::Mutex;

/// Concurrency-safe set of agents currently being reconciled.
#[derive(Debug, Default)]
pub struct InProgress {
    inner: Mutex<HashSet<AgentId>>,
}

impl InProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims an agent. Returns `None` when the agent is already mid-cycle;
    /// the caller skips it rather than queueing behind it.
    #[must_use]
    pub fn begin(self: &Arc<Self>, id: AgentId) -> Option<InProgressGuard> {
        let claimed = self.inner.lock().insert(id);
        claimed.then(|| InProgressGuard { registry: Arc::clone(self), id })
    }

    /// True when the agent is currently claimed.
    #[must_use]
    pub fn contains(&self, id: AgentId) -> bool {
        self.inner.lock().contains(&id)
    }
}

/// Scoped claim on one agent; releases on drop.
#[derive(Debug)]
pub struct InProgressGuard {
    registry: Arc<InProgress>,
    id: AgentId,
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.registry.inner.lock().remove(&self.id);
    }
}
