use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use cgm_fhir_core::{FhirApi, IdentityProvider, Synchronizer, TickOutcome, VendorApi};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Fires a tick every `every` until ctrl-c. Each tick runs in its own task;
/// one that fires while the previous is still running is skipped by the
/// synchronizer itself.
pub async fn run_scheduler<V, I, F>(sync: Arc<Synchronizer<V, I, F>>, every: Duration) -> Result<()>
where
    V: VendorApi + 'static,
    I: IdentityProvider + 'static,
    F: FhirApi + 'static,
{
    let start = Instant::now() + Duration::from_millis(50);
    let mut ticker = interval_at(start, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = every.as_secs(), "starting schedule");

    let mut running: Vec<JoinHandle<()>> = Vec::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("received ctrl-c, stopping");
                break;
            }
            _ = ticker.tick() => {
                running.retain(|handle| !handle.is_finished());
                let sync = sync.clone();
                running.push(tokio::spawn(async move {
                    let report = sync.tick().await;
                    if report.outcome == TickOutcome::Skipped {
                        warn!(tick = report.tick, "tick overran the interval");
                    }
                }));
            }
        }
    }

    for handle in running {
        let _ = handle.await;
    }

    Ok(())
}
