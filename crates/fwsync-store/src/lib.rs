//! Bundled implementations of the fwsync collaborator traits.
//!
//! The engine only knows the traits in `fwsync-core`; this crate supplies
//! the implementations the daemon and the test suites compose:
//!
//! - [`MemoryStore`]: a version-checked in-memory [`fwsync_core::PolicyStore`]
//! - [`MemoryOperationLog`] and [`TracingOperationLog`]: audit sinks
//! - [`SettingsHandle`]: a live-updatable [`fwsync_core::SettingsSource`]

mod log;
mod memory;
mod settings;

pub use log::{MemoryOperationLog, TracingOperationLog};
pub use memory::MemoryStore;
pub use settings::SettingsHandle;
