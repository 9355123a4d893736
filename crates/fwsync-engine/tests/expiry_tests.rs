//! Expiry sweeping against an in-memory store.

use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fwsync_core::{
    AgentId, LogCategory, NewPolicy, PolicySource, PortRange, Protocol, RuleAction, SYSTEM_ACTOR,
    SYSTEM_SOURCE_IP,
};
use fwsync_engine::{ExpirySweeper, SweepOutcome};
use fwsync_store::{MemoryOperationLog, MemoryStore};
use pretty_assertions::assert_eq;

fn policy(limit: Option<u32>, registered: &str) -> NewPolicy {
    NewPolicy {
        agent_id: AgentId(1),
        priority: 1,
        source: PolicySource::DirectIp { ip: Ipv4Addr::new(10, 0, 0, 5), bit: 32 },
        protocol: Protocol::Tcp,
        port: PortRange::single(443),
        action: RuleAction::Accept,
        logging: true,
        time_limit_hours: limit,
        registration_date: registered.parse().unwrap(),
        registrar: "operator".to_string(),
        requester: Some("change-4711".to_string()),
        description: None,
    }
}

fn at(ts: &str) -> DateTime<Utc> {
    ts.parse().unwrap()
}

#[tokio::test]
async fn deletes_only_policies_past_their_derived_expiry() {
    let store = Arc::new(MemoryStore::new());
    let expired = store.seed_policy(policy(Some(2), "2026-01-10T08:00:00Z"));
    let fresh = store.seed_policy(policy(Some(48), "2026-01-10T08:00:00Z"));
    let unlimited = store.seed_policy(policy(None, "2026-01-10T08:00:00Z"));

    let log = Arc::new(MemoryOperationLog::new());
    let sweeper = ExpirySweeper::new(Arc::clone(&store), Arc::clone(&log));

    let outcome = sweeper.sweep(at("2026-01-10T11:00:00Z")).await.unwrap();
    assert_eq!(outcome, SweepOutcome { examined: 1, deleted: 1, failed: 0 });

    let remaining: Vec<_> = store.all_policies().iter().map(|p| p.id).collect();
    assert!(!remaining.contains(&expired.id));
    assert!(remaining.contains(&fresh.id));
    assert!(remaining.contains(&unlimited.id));

    let entries = log.entries();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.actor, SYSTEM_ACTOR);
    assert_eq!(entry.source_ip, SYSTEM_SOURCE_IP);
    assert_eq!(entry.category, LogCategory::Policy);
    assert_eq!(entry.action, "policy expired");
    assert!(entry.success);
    assert!(entry.detail.contains("expired_at=2026-01-10T10:00:00+00:00"));
}

#[tokio::test]
async fn expiry_boundary_is_inclusive() {
    let store = Arc::new(MemoryStore::new());
    store.seed_policy(policy(Some(2), "2026-01-10T08:00:00Z"));
    let log = Arc::new(MemoryOperationLog::new());
    let sweeper = ExpirySweeper::new(Arc::clone(&store), Arc::clone(&log));

    // One second shy of the boundary: untouched.
    let before = sweeper.sweep(at("2026-01-10T09:59:59Z")).await.unwrap();
    assert_eq!(before, SweepOutcome::default());
    assert_eq!(store.policy_count(), 1);

    // Exactly at the boundary: removed.
    let exact = sweeper.sweep(at("2026-01-10T10:00:00Z")).await.unwrap();
    assert_eq!(exact, SweepOutcome { examined: 1, deleted: 1, failed: 0 });
    assert_eq!(store.policy_count(), 0);
}

#[tokio::test]
async fn empty_sweep_records_nothing() {
    let store = Arc::new(MemoryStore::new());
    store.seed_policy(policy(None, "2026-01-10T08:00:00Z"));
    let log = Arc::new(MemoryOperationLog::new());
    let sweeper = ExpirySweeper::new(Arc::clone(&store), Arc::clone(&log));

    let outcome = sweeper.sweep(at("2026-06-01T00:00:00Z")).await.unwrap();
    assert_eq!(outcome, SweepOutcome::default());
    assert!(log.entries().is_empty());
}
