//! Set reconciliation between an agent's live rule set and the local store.

use std::sync::Arc;

use chrono::Utc;
use fwsync_core::{
    Agent, LogCategory, NewPolicy, OperationLog, OperationLogEntry, Policy, PolicyStore,
    RuleTuple,
};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::retry::{ConflictRetry, delete_with_retry, update_priority_with_retry};

/// Mutation counts from one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl ReconcileOutcome {
    /// True when the run applied no mutations; a second run against an
    /// unchanged remote rule set must report this.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0
    }
}

/// Diffs fetched rules against stored policies and applies the minimal
/// mutation set.
///
/// Only unlimited, agent-collected (direct-IP sourced) policies are in
/// scope; manually authored and time-boxed policies are never touched.
/// The match key excludes priority, so a rule whose priority drifted is
/// updated in place instead of being recreated.
pub struct Reconciler<S, L> {
    store: Arc<S>,
    log: Arc<L>,
    retry: ConflictRetry,
}

impl<S, L> Clone for Reconciler<S, L> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store), log: Arc::clone(&self.log), retry: self.retry }
    }
}

impl<S: PolicyStore, L: OperationLog> Reconciler<S, L> {
    pub fn new(store: Arc<S>, log: Arc<L>) -> Self {
        Self { store, log, retry: ConflictRetry::default() }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: ConflictRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Applies create/update/delete mutations so the stored working set
    /// matches `fetched` exactly, rule by rule in delivery order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when a store operation fails or a conflicted
    /// write exhausts its retry budget. Mutations already committed stay
    /// committed; the next cycle converges from there.
    pub async fn reconcile(
        &self,
        agent: &Agent,
        fetched: &[RuleTuple],
    ) -> Result<ReconcileOutcome, EngineError> {
        let stored = self.store.collected_unlimited_policies(agent.id).await?;
        debug!(
            agent = %agent.name,
            fetched = fetched.len(),
            stored = stored.len(),
            "reconciling agent rule set"
        );

        // Everything stored starts out marked for deletion; each fetched
        // rule rescues (or creates) its counterpart.
        let mut to_delete: Vec<Policy> = stored;
        let mut outcome = ReconcileOutcome::default();

        for rule in fetched {
            let key = rule.key();
            // First match in stable store order wins; duplicates on the
            // same key are tolerated and left behind for deletion.
            let matched = to_delete
                .iter()
                .position(|policy| policy.rule_key() == Some(key));

            if let Some(index) = matched {
                let existing = to_delete.remove(index);
                if existing.priority != rule.priority {
                    info!(
                        agent = %agent.name,
                        policy = %existing.id,
                        from = existing.priority,
                        to = rule.priority,
                        "updating drifted policy priority"
                    );
                    update_priority_with_retry(
                        self.store.as_ref(),
                        self.retry,
                        &existing,
                        rule.priority,
                    )
                    .await?;
                    outcome.updated += 1;
                }
            } else {
                let now = Utc::now();
                let created = self
                    .store
                    .insert_policy(NewPolicy::collected(agent.id, rule, now))
                    .await?;
                info!(
                    agent = %agent.name,
                    policy = %created.id,
                    priority = created.priority,
                    source = %created.source,
                    protocol = created.protocol.as_str(),
                    port = %created.port,
                    action = created.action.as_str(),
                    "registered collected policy"
                );
                self.log
                    .record(OperationLogEntry::system(
                        LogCategory::Policy,
                        "policy auto-registered",
                        describe_policy(agent, &created),
                        now,
                    ))
                    .await;
                outcome.created += 1;
            }
        }

        for stale in &to_delete {
            if delete_with_retry(self.store.as_ref(), self.retry, stale).await? {
                self.log
                    .record(OperationLogEntry::system(
                        LogCategory::Policy,
                        "policy auto-deleted",
                        describe_policy(agent, stale),
                        Utc::now(),
                    ))
                    .await;
                outcome.deleted += 1;
            }
        }
        if outcome.deleted > 0 {
            info!(
                agent = %agent.name,
                deleted = outcome.deleted,
                "removed policies no longer present on agent"
            );
        }

        Ok(outcome)
    }
}

/// One-line policy description carried into audit entries.
fn describe_policy(agent: &Agent, policy: &Policy) -> String {
    format!(
        "policy {}: agent={}, priority={}, source={}, protocol={}, port={}, action={}, logging={}",
        policy.id,
        agent.name,
        policy.priority,
        policy.source,
        policy.protocol.as_str(),
        policy.port,
        policy.action.as_str(),
        if policy.logging { "on" } else { "off" },
    )
}
