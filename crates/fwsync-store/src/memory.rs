//! Version-checked in-memory policy store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fwsync_core::{Agent, AgentId, NewPolicy, Policy, PolicyId, PolicyStore, StoreError};
use parking_lot::RwLock;

/// In-memory system of record.
///
/// Every mutation checks the caller's expected version against the stored
/// row and bumps the counter on commit, mirroring how a relational backend
/// with a version column behaves. The `BTreeMap` keeps iteration order
/// stable by id, which is the "arbitrary stable order" the reconciler's
/// duplicate-key tolerance relies on.
#[derive(Debug, Default)]
pub struct MemoryStore {
    agents: RwLock<Vec<Agent>>,
    policies: RwLock<BTreeMap<PolicyId, Policy>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(Vec::new()),
            policies: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Replaces the agent inventory.
    pub fn seed_agents(&self, agents: Vec<Agent>) {
        *self.agents.write() = agents;
    }

    /// Inserts a policy synchronously; convenient for seeding fixtures.
    pub fn seed_policy(&self, policy: NewPolicy) -> Policy {
        let id = PolicyId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let row = materialize(id, policy);
        self.policies.write().insert(id, row.clone());
        row
    }

    /// Bumps a row's version out of band, simulating a concurrent writer.
    /// Returns false when the row does not exist.
    pub fn bump_version(&self, id: PolicyId) -> bool {
        let mut policies = self.policies.write();
        match policies.get_mut(&id) {
            Some(policy) => {
                policy.version += 1;
                true
            }
            None => false,
        }
    }

    /// Snapshot of every stored policy, ordered by id.
    #[must_use]
    pub fn all_policies(&self) -> Vec<Policy> {
        self.policies.read().values().cloned().collect()
    }

    #[must_use]
    pub fn policy_count(&self) -> usize {
        self.policies.read().len()
    }
}

fn materialize(id: PolicyId, policy: NewPolicy) -> Policy {
    Policy {
        id,
        agent_id: policy.agent_id,
        priority: policy.priority,
        source: policy.source,
        protocol: policy.protocol,
        port: policy.port,
        action: policy.action,
        logging: policy.logging,
        time_limit_hours: policy.time_limit_hours,
        registration_date: policy.registration_date,
        registrar: policy.registrar,
        requester: policy.requester,
        description: policy.description,
        version: 0,
    }
}

#[async_trait]
impl PolicyStore for MemoryStore {
    async fn active_agents(&self) -> Result<Vec<Agent>, StoreError> {
        Ok(self
            .agents
            .read()
            .iter()
            .filter(|agent| agent.active)
            .cloned()
            .collect())
    }

    async fn policy(&self, id: PolicyId) -> Result<Policy, StoreError> {
        self.policies
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { id })
    }

    async fn collected_unlimited_policies(
        &self,
        agent: AgentId,
    ) -> Result<Vec<Policy>, StoreError> {
        Ok(self
            .policies
            .read()
            .values()
            .filter(|policy| {
                policy.agent_id == agent
                    && policy.time_limit_hours.is_none()
                    && policy.source.direct_ip().is_some()
            })
            .cloned()
            .collect())
    }

    async fn expired_policies(&self, now: DateTime<Utc>) -> Result<Vec<Policy>, StoreError> {
        Ok(self
            .policies
            .read()
            .values()
            .filter(|policy| policy.is_expired(now))
            .cloned()
            .collect())
    }

    async fn insert_policy(&self, policy: NewPolicy) -> Result<Policy, StoreError> {
        Ok(self.seed_policy(policy))
    }

    async fn update_priority(
        &self,
        id: PolicyId,
        expected_version: u64,
        priority: i32,
    ) -> Result<Policy, StoreError> {
        let mut policies = self.policies.write();
        let policy = policies.get_mut(&id).ok_or(StoreError::NotFound { id })?;
        if policy.version != expected_version {
            return Err(StoreError::VersionConflict {
                id,
                expected: expected_version,
                actual: policy.version,
            });
        }
        policy.priority = priority;
        policy.version += 1;
        Ok(policy.clone())
    }

    async fn delete_policy(&self, id: PolicyId, expected_version: u64) -> Result<(), StoreError> {
        let mut policies = self.policies.write();
        let policy = policies.get(&id).ok_or(StoreError::NotFound { id })?;
        if policy.version != expected_version {
            return Err(StoreError::VersionConflict {
                id,
                expected: expected_version,
                actual: policy.version,
            });
        }
        policies.remove(&id);
        Ok(())
    }
}
