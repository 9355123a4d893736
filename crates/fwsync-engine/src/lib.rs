//! The fwsync policy collection and reconciliation engine.
//!
//! Control flow: a scheduler tick starts a collection cycle; the
//! [`Collector`] lists active agents and fans reconciliation work out under
//! a bounded concurrency limit; per agent, the client fetches the live rule
//! set and the [`Reconciler`] diffs it against the stored policies and
//! applies the minimal create/update/delete set, retrying version conflicts
//! with backoff. The [`ExpirySweeper`] runs on its own independent cadence
//! against the same store.
//!
//! Failures are contained at the agent boundary: no single agent's fetch or
//! write failure can fail the cycle or another agent.

mod collector;
mod error;
mod expiry;
mod progress;
mod reconcile;
mod retry;
pub mod scheduler;

pub use collector::{Collector, CycleSummary};
pub use error::EngineError;
pub use expiry::{ExpirySweeper, SweepOutcome};
pub use progress::{InProgress, InProgressGuard};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use retry::ConflictRetry;
