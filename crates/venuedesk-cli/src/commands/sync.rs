use std::path::Path;
use std::time::Duration;

use venuedesk_core::reconcile::scheduler::run_every;

use crate::commands::common::{build_job, format_history_lines, format_summary_lines, open_store};
use crate::error::CliError;

pub async fn run_sync(
    watch: bool,
    interval_secs: Option<u64>,
    db_path: &Path,
) -> Result<(), CliError> {
    let job = build_job(db_path).await?;

    if !watch {
        let summary = job.run().await?;
        for line in format_summary_lines(&summary) {
            println!("{line}");
        }
        return Ok(());
    }

    let interval = interval_secs
        .map_or(job.settings().interval, Duration::from_secs)
        .max(Duration::from_secs(1));
    println!(
        "Reconciling every {}s, press Ctrl-C to stop",
        interval.as_secs()
    );

    let shutdown = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {error}");
        }
    };
    let completed = run_every(&job, interval, shutdown, |summary| {
        for line in format_summary_lines(summary) {
            println!("{line}");
        }
    })
    .await;

    println!("Stopped after {completed} run(s)");
    Ok(())
}

pub async fn run_sync_history(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let runs = store.recent_runs(limit).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!("No reconciliation runs recorded.");
        return Ok(());
    }
    for line in format_history_lines(&runs) {
        println!("{line}");
    }
    Ok(())
}
