//! Engine-level failure taxonomy.

use fwsync_client::FetchError;
use fwsync_core::{PolicyId, StoreError};
use thiserror::Error;

/// Why one agent's reconciliation unit failed. Contained at the agent
/// boundary by the collector; never propagates across agents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The network fetch against the agent failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A local store operation failed for a non-conflict reason.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A version-conflicted write kept conflicting through the whole
    /// retry budget.
    #[error("conflict retries exhausted on policy {id} after {attempts} attempts")]
    RetriesExhausted { id: PolicyId, attempts: u32 },
}

impl EngineError {
    /// Stable label used in structured log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(err) => err.kind(),
            Self::Store(_) => "store_error",
            Self::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}
