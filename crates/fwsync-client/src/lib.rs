//! Remote agent client for fwsync.
//!
//! One outbound call per cycle per agent: an authenticated `GET` against
//! the agent's rule-set endpoint, normalized into [`fwsync_core::RuleTuple`]s
//! or a typed [`FetchError`]. The client applies conservative connect and
//! request timeouts and never retries; a failed fetch fails that agent for
//! the current cycle only.

mod client;
mod error;

pub use client::{AgentClient, AgentClientConfig, FetchedRules, RULES_PATH};
pub use error::FetchError;
