//! Collaborator traits for the local policy store and the audit log.
//!
//! The engine owns no persistence. It speaks to the system of record
//! through [`PolicyStore`] and records every mutation through
//! [`OperationLog`]. Writes are version-checked: callers pass the version
//! they read, and the store rejects the write with
//! [`StoreError::VersionConflict`] when another writer got there first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{
    Agent, AgentId, NewPolicy, Policy, PolicyId, SYSTEM_ACTOR, SYSTEM_SOURCE_IP,
};

/// Failures surfaced by the policy store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("policy {id} not found")]
    NotFound { id: PolicyId },

    /// Another writer committed between this caller's read and write.
    #[error("version conflict on policy {id}: expected {expected}, found {actual}")]
    VersionConflict { id: PolicyId, expected: u64, actual: u64 },

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// True for conflicts that a bounded re-read/retry loop may resolve.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

/// The local system of record for agents and policies.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Agents currently flagged active.
    async fn active_agents(&self) -> Result<Vec<Agent>, StoreError>;

    /// One policy row by id, with its current version.
    async fn policy(&self, id: PolicyId) -> Result<Policy, StoreError>;

    /// Unlimited, agent-collected (direct-IP sourced) policies for one
    /// agent: the reconciliation working set. Manual and time-boxed
    /// policies are excluded by construction.
    async fn collected_unlimited_policies(&self, agent: AgentId)
    -> Result<Vec<Policy>, StoreError>;

    /// Time-boxed policies whose derived expiry is at or before `now`.
    async fn expired_policies(&self, now: DateTime<Utc>) -> Result<Vec<Policy>, StoreError>;

    /// Inserts a new policy and returns it with id and version assigned.
    async fn insert_policy(&self, policy: NewPolicy) -> Result<Policy, StoreError>;

    /// Updates only the priority of a policy, checked against
    /// `expected_version`.
    async fn update_priority(
        &self,
        id: PolicyId,
        expected_version: u64,
        priority: i32,
    ) -> Result<Policy, StoreError>;

    /// Deletes a policy, checked against `expected_version`.
    async fn delete_policy(&self, id: PolicyId, expected_version: u64) -> Result<(), StoreError>;
}

/// Category of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    /// Policy lifecycle events (create/update/delete/expire).
    Policy,
    /// Object catalog events. The engine never emits these; the variant is
    /// part of the shared log schema for collaborators that manage the
    /// catalog and write to the same log.
    Object,
}

impl LogCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::Object => "object",
        }
    }
}

/// One audit record explaining a mutation after the fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationLogEntry {
    pub actor: String,
    pub source_ip: String,
    pub success: bool,
    pub detail: String,
    pub category: LogCategory,
    /// Short label of what was done, e.g. "policy auto-registered".
    pub action: String,
    pub at: DateTime<Utc>,
}

impl OperationLogEntry {
    /// Entry for an engine-originated mutation: system actor, local source.
    #[must_use]
    pub fn system(
        category: LogCategory,
        action: impl Into<String>,
        detail: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            actor: SYSTEM_ACTOR.to_string(),
            source_ip: SYSTEM_SOURCE_IP.to_string(),
            success: true,
            detail: detail.into(),
            category,
            action: action.into(),
            at,
        }
    }
}

/// Sink for audit entries. Persistence is a collaborator concern; the
/// engine only appends.
#[async_trait]
pub trait OperationLog: Send + Sync {
    async fn record(&self, entry: OperationLogEntry);
}
