//! Live-updatable settings handle.

use std::sync::Arc;

use fwsync_core::{SettingsSnapshot, SettingsSource};
use parking_lot::RwLock;

/// Shared settings cell. Operators (or tests) update it at any time; each
/// scheduling decision reads a fresh snapshot, so changes take effect on
/// the very next tick without a restart.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<SettingsSnapshot>>,
}

impl SettingsHandle {
    #[must_use]
    pub fn new(initial: SettingsSnapshot) -> Self {
        Self { inner: Arc::new(RwLock::new(initial)) }
    }

    /// Applies an in-place update, visible to the next snapshot.
    pub fn update(&self, apply: impl FnOnce(&mut SettingsSnapshot)) {
        apply(&mut self.inner.write());
    }
}

impl SettingsSource for SettingsHandle {
    fn snapshot(&self) -> SettingsSnapshot {
        *self.inner.read()
    }
}
