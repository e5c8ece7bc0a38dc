//! Read-only progress view over a batch's runs.

use std::time::Duration;

use tastebuds_core::{now_millis, Error, Result};
use tastebuds_store::{Run, SqliteStore};

use crate::types::{BatchProgress, RunView};

/// Snapshot the runs of `batch_id` as of now.
pub fn poll(store: &SqliteStore, batch_id: &str) -> Result<BatchProgress> {
    let runs = store.list_runs(batch_id)?;
    Ok(poll_at(&runs, now_millis()))
}

/// Build the progress view for `runs` (already in `order`) at instant `now`.
pub fn poll_at(runs: &[Run], now: i64) -> BatchProgress {
    let runs: Vec<RunView> = runs.iter().map(|r| RunView::at(r, now)).collect();
    let completed_count = runs.iter().filter(|r| r.is_terminal()).count();
    let total_count = runs.len();
    BatchProgress {
        runs,
        completed_count,
        total_count,
        done: completed_count == total_count,
    }
}

/// Poll every `interval` until every run is terminal.
pub async fn wait_until_done(
    store: &SqliteStore,
    batch_id: &str,
    interval: Duration,
) -> Result<BatchProgress> {
    if store.get_batch(batch_id)?.is_none() {
        return Err(Error::NotFound(format!("Batch {}", batch_id)));
    }
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let progress = poll(store, batch_id)?;
        if progress.done {
            return Ok(progress);
        }
    }
}
