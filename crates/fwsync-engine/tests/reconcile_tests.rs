//! Reconciler behavior against an in-memory store.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fwsync_core::{
    Agent, AgentId, NewPolicy, Policy, PolicyId, PolicySource, PolicyStore, PortRange, Protocol,
    RuleAction, RuleTuple, SYSTEM_ACTOR, StoreError,
};
use fwsync_engine::{ConflictRetry, Reconciler};
use fwsync_store::{MemoryOperationLog, MemoryStore};
use pretty_assertions::assert_eq;

fn agent() -> Agent {
    Agent {
        id: AgentId(1),
        name: "edge-fw-01".to_string(),
        address: "10.1.1.1".to_string(),
        api_key: None,
        active: true,
    }
}

fn rule(priority: i32, ip: [u8; 4], bit: u8, port: PortRange, action: RuleAction) -> RuleTuple {
    RuleTuple {
        priority,
        ip: Ipv4Addr::from(ip),
        bit,
        protocol: Protocol::Tcp,
        port,
        action,
    }
}

fn stored(agent_id: AgentId, rule: &RuleTuple) -> NewPolicy {
    NewPolicy::collected(agent_id, rule, Utc::now())
}

fn fast_retry() -> ConflictRetry {
    ConflictRetry { max_attempts: 3, base_backoff: Duration::from_millis(1), multiplier: 2 }
}

fn reconciler(
    store: &Arc<MemoryStore>,
    log: &Arc<MemoryOperationLog>,
) -> Reconciler<MemoryStore, MemoryOperationLog> {
    Reconciler::new(Arc::clone(store), Arc::clone(log)).with_retry(fast_retry())
}

#[tokio::test]
async fn creates_policy_for_new_rule() {
    let store = Arc::new(MemoryStore::new());
    let log = Arc::new(MemoryOperationLog::new());
    let fetched = [rule(1, [10, 0, 0, 5], 32, PortRange::single(443), RuleAction::Accept)];

    let outcome = reconciler(&store, &log)
        .reconcile(&agent(), &fetched)
        .await
        .unwrap();

    assert_eq!((outcome.created, outcome.updated, outcome.deleted), (1, 0, 0));
    let policies = store.all_policies();
    assert_eq!(policies.len(), 1);
    let created = &policies[0];
    assert_eq!(created.port, PortRange::single(443));
    assert_eq!(created.action, RuleAction::Accept);
    assert_eq!(created.time_limit_hours, None);
    assert!(created.logging);
    assert_eq!(created.registrar, SYSTEM_ACTOR);
    assert_eq!(
        created.source,
        PolicySource::DirectIp { ip: Ipv4Addr::new(10, 0, 0, 5), bit: 32 }
    );
    assert_eq!(log.len(), 1);
}

#[tokio::test]
async fn priority_drift_updates_in_place() {
    let store = Arc::new(MemoryStore::new());
    let log = Arc::new(MemoryOperationLog::new());
    let base = rule(1, [10, 0, 0, 5], 32, PortRange::single(443), RuleAction::Accept);
    let existing = store.seed_policy(stored(AgentId(1), &base));

    let fetched = [RuleTuple { priority: 5, ..base }];
    let outcome = reconciler(&store, &log)
        .reconcile(&agent(), &fetched)
        .await
        .unwrap();

    assert_eq!((outcome.created, outcome.updated, outcome.deleted), (0, 1, 0));
    let policies = store.all_policies();
    assert_eq!(policies.len(), 1);
    // Same row, new priority, bumped version.
    assert_eq!(policies[0].id, existing.id);
    assert_eq!(policies[0].priority, 5);
    assert_eq!(policies[0].version, existing.version + 1);
}

#[tokio::test]
async fn stale_policy_is_deleted() {
    let store = Arc::new(MemoryStore::new());
    let log = Arc::new(MemoryOperationLog::new());
    let keep = rule(1, [10, 0, 0, 5], 32, PortRange::single(443), RuleAction::Accept);
    let stale = rule(2, [10, 0, 0, 6], 32, PortRange::single(22), RuleAction::Reject);
    store.seed_policy(stored(AgentId(1), &keep));
    let stale_row = store.seed_policy(stored(AgentId(1), &stale));

    let outcome = reconciler(&store, &log)
        .reconcile(&agent(), &[keep])
        .await
        .unwrap();

    assert_eq!((outcome.created, outcome.updated, outcome.deleted), (0, 0, 1));
    let remaining = store.all_policies();
    assert_eq!(remaining.len(), 1);
    assert_ne!(remaining[0].id, stale_row.id);
}

#[tokio::test]
async fn second_run_is_a_noop() {
    let store = Arc::new(MemoryStore::new());
    let log = Arc::new(MemoryOperationLog::new());
    let fetched = [
        rule(1, [10, 0, 0, 5], 32, PortRange::single(443), RuleAction::Accept),
        rule(2, [192, 168, 0, 0], 24, PortRange::range(8000, 8080), RuleAction::Reject),
    ];

    let reconciler = reconciler(&store, &log);
    let first = reconciler.reconcile(&agent(), &fetched).await.unwrap();
    assert_eq!(first.created, 2);

    let second = reconciler.reconcile(&agent(), &fetched).await.unwrap();
    assert!(second.is_noop(), "second run mutated: {second:?}");
    assert_eq!(store.policy_count(), 2);
}

#[tokio::test]
async fn stored_working_set_matches_fetched_set_exactly() {
    let store = Arc::new(MemoryStore::new());
    let log = Arc::new(MemoryOperationLog::new());
    // Start from a store that overlaps the fetched set partially.
    let shared = rule(1, [10, 0, 0, 5], 32, PortRange::single(443), RuleAction::Accept);
    let stale = rule(9, [172, 16, 0, 1], 32, PortRange::single(25), RuleAction::Reject);
    store.seed_policy(stored(AgentId(1), &shared));
    store.seed_policy(stored(AgentId(1), &stale));

    let fetched = [
        shared,
        rule(2, [10, 0, 0, 7], 32, PortRange::single(80), RuleAction::Accept),
        rule(3, [192, 168, 0, 0], 16, PortRange::range(1000, 2000), RuleAction::Reject),
    ];
    reconciler(&store, &log)
        .reconcile(&agent(), &fetched)
        .await
        .unwrap();

    let stored_keys: HashSet<_> = store
        .all_policies()
        .iter()
        .filter_map(Policy::rule_key)
        .collect();
    let fetched_keys: HashSet<_> = fetched.iter().map(RuleTuple::key).collect();
    assert_eq!(stored_keys, fetched_keys);
}

#[tokio::test]
async fn manual_and_time_boxed_policies_are_untouched() {
    let store = Arc::new(MemoryStore::new());
    let log = Arc::new(MemoryOperationLog::new());

    let mut manual = stored(
        AgentId(1),
        &rule(7, [10, 9, 9, 9], 32, PortRange::single(3306), RuleAction::Accept),
    );
    manual.source = PolicySource::General { object_id: 42 };
    manual.registrar = "operator".to_string();
    let manual_row = store.seed_policy(manual);

    let mut boxed = stored(
        AgentId(1),
        &rule(8, [10, 8, 8, 8], 32, PortRange::single(5432), RuleAction::Accept),
    );
    boxed.time_limit_hours = Some(24);
    let boxed_row = store.seed_policy(boxed);

    // Empty fetched set: every reconcilable policy would be deleted.
    let outcome = reconciler(&store, &log)
        .reconcile(&agent(), &[])
        .await
        .unwrap();

    assert!(outcome.is_noop());
    let ids: HashSet<PolicyId> = store.all_policies().iter().map(|p| p.id).collect();
    assert!(ids.contains(&manual_row.id));
    assert!(ids.contains(&boxed_row.id));
}

#[tokio::test]
async fn duplicate_key_rows_keep_first_and_delete_rest() {
    let store = Arc::new(MemoryStore::new());
    let log = Arc::new(MemoryOperationLog::new());
    let base = rule(1, [10, 0, 0, 5], 32, PortRange::single(443), RuleAction::Accept);
    let first = store.seed_policy(stored(AgentId(1), &base));
    let second = store.seed_policy(stored(AgentId(1), &base));

    let outcome = reconciler(&store, &log)
        .reconcile(&agent(), &[base])
        .await
        .unwrap();

    assert_eq!((outcome.created, outcome.updated, outcome.deleted), (0, 0, 1));
    let remaining = store.all_policies();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, first.id);
    assert_ne!(remaining[0].id, second.id);
}

/// Store wrapper that fails the first N priority updates with a version
/// conflict, simulating a concurrent writer landing between read and write.
struct ConflictingStore {
    inner: Arc<MemoryStore>,
    conflicts_left: AtomicUsize,
}

#[async_trait]
impl PolicyStore for ConflictingStore {
    async fn active_agents(&self) -> Result<Vec<Agent>, StoreError> {
        self.inner.active_agents().await
    }

    async fn policy(&self, id: PolicyId) -> Result<Policy, StoreError> {
        self.inner.policy(id).await
    }

    async fn collected_unlimited_policies(
        &self,
        agent: AgentId,
    ) -> Result<Vec<Policy>, StoreError> {
        self.inner.collected_unlimited_policies(agent).await
    }

    async fn expired_policies(&self, now: DateTime<Utc>) -> Result<Vec<Policy>, StoreError> {
        self.inner.expired_policies(now).await
    }

    async fn insert_policy(&self, policy: NewPolicy) -> Result<Policy, StoreError> {
        self.inner.insert_policy(policy).await
    }

    async fn update_priority(
        &self,
        id: PolicyId,
        expected_version: u64,
        priority: i32,
    ) -> Result<Policy, StoreError> {
        if self
            .conflicts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            let actual = self.inner.policy(id).await?.version;
            return Err(StoreError::VersionConflict { id, expected: expected_version, actual });
        }
        self.inner.update_priority(id, expected_version, priority).await
    }

    async fn delete_policy(&self, id: PolicyId, expected_version: u64) -> Result<(), StoreError> {
        self.inner.delete_policy(id, expected_version).await
    }
}

#[tokio::test]
async fn version_conflict_is_absorbed_by_retry() {
    let inner = Arc::new(MemoryStore::new());
    let base = rule(1, [10, 0, 0, 5], 32, PortRange::single(443), RuleAction::Accept);
    let existing = inner.seed_policy(stored(AgentId(1), &base));

    let store = Arc::new(ConflictingStore {
        inner: Arc::clone(&inner),
        conflicts_left: AtomicUsize::new(1),
    });
    let log = Arc::new(MemoryOperationLog::new());
    let reconciler = Reconciler::new(store, Arc::clone(&log)).with_retry(fast_retry());

    let fetched = [RuleTuple { priority: 5, ..base }];
    let outcome = reconciler.reconcile(&agent(), &fetched).await.unwrap();

    assert_eq!(outcome.updated, 1);
    let current = inner.policy(existing.id).await.unwrap();
    assert_eq!(current.priority, 5);
}

#[tokio::test]
async fn persistent_conflict_exhausts_retries() {
    let inner = Arc::new(MemoryStore::new());
    let base = rule(1, [10, 0, 0, 5], 32, PortRange::single(443), RuleAction::Accept);
    let existing = inner.seed_policy(stored(AgentId(1), &base));

    let store = Arc::new(ConflictingStore {
        inner: Arc::clone(&inner),
        conflicts_left: AtomicUsize::new(usize::MAX),
    });
    let log = Arc::new(MemoryOperationLog::new());
    let reconciler = Reconciler::new(store, Arc::clone(&log)).with_retry(fast_retry());

    let fetched = [RuleTuple { priority: 5, ..base }];
    let err = reconciler.reconcile(&agent(), &fetched).await.unwrap_err();
    assert_eq!(
        err,
        fwsync_engine::EngineError::RetriesExhausted { id: existing.id, attempts: 3 }
    );
    // The stored row is untouched.
    assert_eq!(inner.policy(existing.id).await.unwrap().priority, 1);
}
