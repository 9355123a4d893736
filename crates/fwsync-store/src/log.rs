//! Operation log sinks.

use async_trait::async_trait;
use fwsync_core::{OperationLog, OperationLogEntry};
use parking_lot::Mutex;
use tracing::info;

/// Audit sink that keeps entries in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemoryOperationLog {
    entries: Mutex<Vec<OperationLogEntry>>,
}

impl MemoryOperationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded entries.
    #[must_use]
    pub fn entries(&self) -> Vec<OperationLogEntry> {
        self.entries.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl OperationLog for MemoryOperationLog {
    async fn record(&self, entry: OperationLogEntry) {
        self.entries.lock().push(entry);
    }
}

/// Audit sink that emits one structured log event per entry. The daemon
/// uses this; durable persistence belongs to an external collaborator.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingOperationLog;

#[async_trait]
impl OperationLog for TracingOperationLog {
    async fn record(&self, entry: OperationLogEntry) {
        info!(
            target: "fwsync::audit",
            actor = %entry.actor,
            source_ip = %entry.source_ip,
            success = entry.success,
            category = entry.category.as_str(),
            action = %entry.action,
            detail = %entry.detail,
            at = %entry.at,
            "operation recorded"
        );
    }
}
