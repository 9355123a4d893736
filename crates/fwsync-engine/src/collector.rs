//! Collection cycle orchestration.

use std::sync::Arc;

use chrono::Utc;
use fwsync_client::AgentClient;
use fwsync_core::{
    AgentId, LogCategory, OperationLog, OperationLogEntry, PolicyStore, SettingsSnapshot,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::progress::InProgress;
use crate::reconcile::{ReconcileOutcome, Reconciler};
use crate::retry::ConflictRetry;

/// Aggregated outcome of one collection cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Correlation id stamped on every log line of the cycle.
    pub cycle_id: Uuid,
    /// Active agents at cycle start.
    pub agents: usize,
    /// Agents actually submitted this cycle.
    pub processed: usize,
    /// Agents skipped because an overlapping cycle still holds them.
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Agents whose work ran past the cycle deadline and was abandoned in
    /// place; they stay claimed until their task finishes.
    pub abandoned: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Malformed rules skipped during payload normalization.
    pub rules_skipped: usize,
}

struct AgentReport {
    agent_id: AgentId,
    agent_name: String,
    result: Result<(ReconcileOutcome, usize), EngineError>,
}

/// Fans reconciliation work out across all active agents, bounded by the
/// concurrency limit from the cycle's settings snapshot.
///
/// Failures are contained per agent: a fetch or write failure marks that
/// agent failed for this cycle and nothing else.
pub struct Collector<S, L> {
    store: Arc<S>,
    log: Arc<L>,
    client: AgentClient,
    reconciler: Reconciler<S, L>,
    in_progress: Arc<InProgress>,
}

impl<S, L> Collector<S, L>
where
    S: PolicyStore + 'static,
    L: OperationLog + 'static,
{
    pub fn new(store: Arc<S>, log: Arc<L>, client: AgentClient) -> Self {
        let reconciler = Reconciler::new(Arc::clone(&store), Arc::clone(&log));
        Self { store, log, client, reconciler, in_progress: Arc::new(InProgress::new()) }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: ConflictRetry) -> Self {
        self.reconciler = self.reconciler.with_retry(retry);
        self
    }

    /// The per-agent claim registry, shared with overlapping cycles.
    #[must_use]
    pub fn in_progress(&self) -> &Arc<InProgress> {
        &self.in_progress
    }

    /// Runs one full collection cycle and reports its summary.
    ///
    /// The settings snapshot is taken by the caller at cycle start and not
    /// re-read mid-cycle.
    pub async fn run_cycle(&self, settings: &SettingsSnapshot) -> CycleSummary {
        let cycle_id = Uuid::new_v4();
        let mut summary = CycleSummary { cycle_id, ..CycleSummary::default() };

        let agents = match self.store.active_agents().await {
            Ok(agents) => agents,
            Err(err) => {
                error!(cycle = %cycle_id, error = %err, "failed to list active agents");
                return summary;
            }
        };
        summary.agents = agents.len();
        if agents.is_empty() {
            info!(cycle = %cycle_id, "no active agents, skipping collection cycle");
            return summary;
        }

        info!(
            cycle = %cycle_id,
            agents = agents.len(),
            concurrency = settings.concurrency_limit,
            "collection cycle started"
        );

        let semaphore = Arc::new(Semaphore::new(settings.concurrency_limit.max(1)));
        let mut join_set = JoinSet::new();

        for agent in agents {
            let Some(guard) = self.in_progress.begin(agent.id) else {
                debug!(cycle = %cycle_id, agent = %agent.name, "agent still mid-cycle, skipping");
                summary.skipped += 1;
                continue;
            };

            let semaphore = Arc::clone(&semaphore);
            let client = self.client.clone();
            let reconciler = self.reconciler.clone();
            let port = settings.agent_port;

            join_set.spawn(async move {
                // Held for the whole unit of work, released on every exit path.
                let _guard = guard;
                let agent_id = agent.id;
                let agent_name = agent.name.clone();

                let result = async {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| EngineError::Fetch(fwsync_client::FetchError::Unreachable(
                            "cycle concurrency gate closed".to_string(),
                        )))?;
                    let fetched = client.fetch_rules(&agent, port).await?;
                    let outcome = reconciler.reconcile(&agent, &fetched.rules).await?;
                    Ok((outcome, fetched.skipped))
                }
                .await;

                AgentReport { agent_id, agent_name, result }
            });
            summary.processed += 1;
        }

        let deadline = tokio::time::Instant::now() + settings.cycle_deadline;
        loop {
            match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                Ok(Some(joined)) => self.tally(cycle_id, &mut summary, joined).await,
                Ok(None) => break,
                Err(_) => {
                    summary.abandoned = join_set.len();
                    warn!(
                        cycle = %cycle_id,
                        abandoned = summary.abandoned,
                        "cycle deadline exceeded, abandoning outstanding agent work"
                    );
                    // Abandoned tasks keep running detached; their claims
                    // release when they finish, and the next cycle skips
                    // them until then.
                    join_set.detach_all();
                    break;
                }
            }
        }

        info!(
            cycle = %cycle_id,
            agents = summary.agents,
            processed = summary.processed,
            skipped = summary.skipped,
            succeeded = summary.succeeded,
            failed = summary.failed,
            abandoned = summary.abandoned,
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            rules_skipped = summary.rules_skipped,
            "collection cycle finished"
        );
        summary
    }

    async fn tally(
        &self,
        cycle_id: Uuid,
        summary: &mut CycleSummary,
        joined: Result<AgentReport, tokio::task::JoinError>,
    ) {
        match joined {
            Ok(report) => match report.result {
                Ok((outcome, rules_skipped)) => {
                    summary.succeeded += 1;
                    summary.created += outcome.created;
                    summary.updated += outcome.updated;
                    summary.deleted += outcome.deleted;
                    summary.rules_skipped += rules_skipped;
                }
                Err(err) => {
                    summary.failed += 1;
                    error!(
                        cycle = %cycle_id,
                        agent = %report.agent_name,
                        agent_id = %report.agent_id,
                        kind = err.kind(),
                        error = %err,
                        "agent reconciliation failed"
                    );
                    let mut entry = OperationLogEntry::system(
                        LogCategory::Policy,
                        "policy collection failed",
                        format!("agent {} ({}): {err}", report.agent_name, report.agent_id),
                        Utc::now(),
                    );
                    entry.success = false;
                    self.log.record(entry).await;
                }
            },
            Err(join_err) => {
                summary.failed += 1;
                error!(cycle = %cycle_id, error = %join_err, "agent task aborted unexpectedly");
            }
        }
    }
}
