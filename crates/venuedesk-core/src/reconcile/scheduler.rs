//! Fixed-interval driver for reconciliation runs

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::job::ReconciliationJob;
use super::summary::ReconcileSummary;
use crate::error::Error;

/// Run `job` every `interval` until `shutdown` resolves.
///
/// The first run starts immediately. Runs are awaited inline, so a slow run
/// delays the next tick instead of overlapping it; ticks missed meanwhile
/// are skipped. `on_summary` sees every completed run. Returns the number of
/// completed runs.
pub async fn run_every<F>(
    job: &ReconciliationJob,
    interval: Duration,
    shutdown: impl Future<Output = ()>,
    mut on_summary: F,
) -> usize
where
    F: FnMut(&ReconcileSummary),
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut completed = 0;
    loop {
        tokio::select! {
            biased;
            () = &mut shutdown => {
                tracing::info!(completed, "Reconciliation scheduler stopping");
                return completed;
            }
            _ = ticker.tick() => {
                match job.run().await {
                    Ok(summary) => {
                        completed += 1;
                        if !summary.is_clean() {
                            tracing::warn!(
                                run_id = %summary.run_id,
                                errors = summary.errors.len(),
                                "Reconciliation finished with errors"
                            );
                        }
                        on_summary(&summary);
                    }
                    Err(Error::RunInProgress(holder)) => {
                        tracing::info!(%holder, "Skipping tick, another run holds the lease");
                    }
                    Err(error) => {
                        tracing::error!("Reconciliation run failed: {error}");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::SyncSettings;
    use crate::mapper::MapperContext;
    use crate::remote::fake::FakeCrm;
    use crate::services::StoreService;

    #[tokio::test(flavor = "multi_thread")]
    async fn runs_until_shutdown_and_records_each_run() {
        let store = StoreService::open_in_memory().await.unwrap();
        let job = ReconciliationJob::new(
            Arc::new(FakeCrm::new()),
            store.clone(),
            MapperContext::default(),
            SyncSettings::default(),
        );

        let mut seen = Vec::new();
        let completed = run_every(
            &job,
            Duration::from_millis(10),
            tokio::time::sleep(Duration::from_millis(60)),
            |summary| seen.push(summary.run_id.clone()),
        )
        .await;

        assert!(completed >= 1);
        assert_eq!(seen.len(), completed);
        assert_eq!(store.recent_runs(100).await.unwrap().len(), completed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolved_shutdown_prevents_any_run() {
        let store = StoreService::open_in_memory().await.unwrap();
        let job = ReconciliationJob::new(
            Arc::new(FakeCrm::new()),
            store.clone(),
            MapperContext::default(),
            SyncSettings::default(),
        );

        let completed = run_every(&job, Duration::from_secs(60), async {}, |_| {}).await;

        assert_eq!(completed, 0);
        assert!(store.recent_runs(10).await.unwrap().is_empty());
    }
}
