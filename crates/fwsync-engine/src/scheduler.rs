//! Dynamic scheduling loops for collection and expiry.
//!
//! Both loops re-read the configured interval from a fresh settings
//! snapshot on every tick, so an operator's cadence change takes effect on
//! the very next scheduling decision without a restart. The next fire time
//! is computed from cycle completion, not from a fixed cadence anchored at
//! startup.

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fwsync_core::{OperationLog, PolicyStore, SettingsSource};
use tokio::sync::watch;
use tracing::{error, info};

use crate::collector::Collector;
use crate::expiry::ExpirySweeper;

/// Delay before the first collection cycle after process start, leaving
/// dependent components time to finish initializing.
pub const STARTUP_GRACE: Duration = Duration::from_secs(60);

/// Runs collection cycles until `shutdown` flips to true.
///
/// First run fires after [`STARTUP_GRACE`]; afterwards each cycle is
/// followed by a pause of the collection interval read after that cycle
/// completed.
pub async fn run_collection_loop<S, L>(
    collector: Arc<Collector<S, L>>,
    settings: Arc<dyn SettingsSource>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: PolicyStore + 'static,
    L: OperationLog + 'static,
{
    info!(grace_secs = STARTUP_GRACE.as_secs(), "collection scheduler started");
    if wait_or_shutdown(STARTUP_GRACE, &mut shutdown).await {
        return;
    }
    loop {
        let snapshot = settings.snapshot();
        collector.run_cycle(&snapshot).await;

        let interval = settings.snapshot().collection_interval;
        info!(next_secs = interval.as_secs(), "next collection cycle scheduled");
        if wait_or_shutdown(interval, &mut shutdown).await {
            return;
        }
    }
}

/// Runs expiry sweeps until `shutdown` flips to true. The first sweep
/// fires after one full interval.
pub async fn run_expiry_loop<S, L>(
    sweeper: Arc<ExpirySweeper<S, L>>,
    settings: Arc<dyn SettingsSource>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: PolicyStore + 'static,
    L: OperationLog + 'static,
{
    info!("expiry scheduler started");
    loop {
        let interval = settings.snapshot().expiry_interval;
        if wait_or_shutdown(interval, &mut shutdown).await {
            return;
        }
        if let Err(err) = sweeper.sweep(Utc::now()).await {
            error!(error = %err, "expiry sweep failed");
        }
    }
}

/// Sleeps for `duration`, returning early with `true` when shutdown is
/// signalled.
async fn wait_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let mut sleep = pin!(tokio::time::sleep(duration));
    loop {
        tokio::select! {
            () = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}
