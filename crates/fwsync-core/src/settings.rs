//! Live-readable engine settings.
//!
//! Operators can change intervals and the concurrency cap while the service
//! runs. Each scheduling decision and each cycle takes an immutable
//! [`SettingsSnapshot`] at its start instead of consulting shared state
//! mid-operation, so a mid-cycle settings change only affects the next tick.

use std::time::Duration;

/// Immutable view of the engine settings at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsSnapshot {
    /// Pause between collection cycles, measured from cycle completion.
    pub collection_interval: Duration,
    /// Pause between expiry sweeps.
    pub expiry_interval: Duration,
    /// Maximum number of agents reconciled simultaneously in one cycle.
    pub concurrency_limit: usize,
    /// TCP port the agents' rule-set endpoint listens on.
    pub agent_port: u16,
    /// Hard bound on one collection cycle; work past it is abandoned.
    pub cycle_deadline: Duration,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            collection_interval: Duration::from_secs(300),
            expiry_interval: Duration::from_secs(3600),
            concurrency_limit: 10,
            agent_port: 8080,
            cycle_deadline: Duration::from_secs(30 * 60),
        }
    }
}

/// Source of engine settings, re-read on every scheduling decision.
pub trait SettingsSource: Send + Sync {
    /// Current settings. Implementations must not cache staleness away from
    /// the operator; every call reflects the latest configured values.
    fn snapshot(&self) -> SettingsSnapshot;
}
