//! Registry of ingestion runs started over HTTP
//!
//! Each upload hands its [`IngestHandle`] to the registry, which awaits it on
//! a tracked task and keeps the outcome for `GET /runs/:run_id`. Only the
//! most recently finished runs are kept. On shutdown every run still in
//! flight is cancelled and awaited.

use chrono::{DateTime, Utc};
use roster_ingest::{IngestHandle, PipelineState, RunSummary};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::DEFAULT_RETAINED_RUNS;

/// What `GET /runs/:run_id` reports
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub run_id: Uuid,
    pub file: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: PipelineState,
    /// Present once the run is done
    pub summary: Option<RunSummary>,
    /// Set when the run could not report a summary
    pub error: Option<String>,
}

struct RunEntry {
    file: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    state: watch::Receiver<PipelineState>,
    cancel: CancellationToken,
    outcome: Option<Result<RunSummary, String>>,
}

impl RunEntry {
    fn status(&self, run_id: Uuid) -> RunStatus {
        let (summary, error) = match &self.outcome {
            Some(Ok(summary)) => (Some(summary.clone()), None),
            Some(Err(e)) => (None, Some(e.clone())),
            None => (None, None),
        };

        RunStatus {
            run_id,
            file: self.file.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            state: *self.state.borrow(),
            summary,
            error,
        }
    }
}

/// Drop the oldest finished runs beyond `keep`; in-flight runs always stay
fn prune_finished(runs: &mut HashMap<Uuid, RunEntry>, keep: usize) {
    let mut finished: Vec<(DateTime<Utc>, Uuid)> = runs
        .iter()
        .filter_map(|(run_id, entry)| entry.finished_at.map(|at| (at, *run_id)))
        .collect();
    if finished.len() <= keep {
        return;
    }

    finished.sort_unstable();
    let excess = finished.len() - keep;
    for (_, run_id) in finished.into_iter().take(excess) {
        runs.remove(&run_id);
    }
    debug!(evicted = excess, kept = keep, "Evicted finished runs");
}

/// Runs in flight plus the most recently finished ones
#[derive(Clone)]
pub struct RunRegistry {
    runs: Arc<RwLock<HashMap<Uuid, RunEntry>>>,
    tasks: Arc<Mutex<JoinSet<()>>>,
    retain_finished: usize,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAINED_RUNS)
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `retain_finished` finished runs queryable
    pub fn with_retention(retain_finished: usize) -> Self {
        Self {
            runs: Arc::default(),
            tasks: Arc::default(),
            retain_finished,
        }
    }

    /// Track a started run; returns its id
    pub async fn register(&self, file: impl Into<String>, handle: IngestHandle) -> Uuid {
        let run_id = handle.run_id();
        let entry = RunEntry {
            file: file.into(),
            started_at: Utc::now(),
            finished_at: None,
            state: handle.subscribe(),
            cancel: handle.cancellation_token(),
            outcome: None,
        };
        self.runs.write().await.insert(run_id, entry);

        let runs = Arc::clone(&self.runs);
        let retain_finished = self.retain_finished;
        let mut tasks = self.tasks.lock().await;

        // Reap finished waiters so the set does not grow without bound
        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "Run waiter panicked");
            }
        }

        tasks.spawn(async move {
            let outcome = handle.wait().await.map_err(|e| {
                error!(%run_id, error = %e, "Ingestion run did not complete");
                e.to_string()
            });

            let mut entries = runs.write().await;
            if let Some(entry) = entries.get_mut(&run_id) {
                entry.finished_at = Some(Utc::now());
                entry.outcome = Some(outcome);
            }
            prune_finished(&mut entries, retain_finished);
        });

        run_id
    }

    pub async fn status(&self, run_id: Uuid) -> Option<RunStatus> {
        self.runs
            .read()
            .await
            .get(&run_id)
            .map(|entry| entry.status(run_id))
    }

    /// All runs, most recent first
    pub async fn list(&self) -> Vec<RunStatus> {
        let mut runs: Vec<RunStatus> = self
            .runs
            .read()
            .await
            .iter()
            .map(|(run_id, entry)| entry.status(*run_id))
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs
    }

    /// Runs that have not reached `Done`
    pub async fn active(&self) -> usize {
        self.runs
            .read()
            .await
            .values()
            .filter(|entry| entry.outcome.is_none())
            .count()
    }

    /// Cancel in-flight runs and wait for them to finish draining.
    ///
    /// Returns `false` if `timeout` elapsed first; those runs are abandoned.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let active = {
            let runs = self.runs.read().await;
            let mut active = 0;
            for entry in runs.values().filter(|entry| entry.outcome.is_none()) {
                entry.cancel.cancel();
                active += 1;
            }
            active
        };

        if active > 0 {
            info!(runs = active, "Cancelling in-flight ingestion runs");
        }

        let mut tasks = self.tasks.lock().await;
        let drained = tokio::time::timeout(timeout, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Run waiter panicked");
                }
            }
        })
        .await;

        match drained {
            Ok(()) => true,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "Timed out waiting for ingestion runs");
                tasks.abort_all();
                false
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use roster_ingest::{IngestPipeline, MemorySink, PipelineConfig};
    use std::io::Cursor;

    fn csv(rows: usize) -> Cursor<Vec<u8>> {
        let mut data = String::from("first_name,last_name,email,age,gender,department,company,salary,date_joined,is_active\n");
        for n in 0..rows {
            data.push_str(&format!("F{n},L{n},u{n}@example.com,30,F,Ops,Acme,1.0,2020-01-01,true\n"));
        }
        Cursor::new(data.into_bytes())
    }

    async fn wait_until_done(registry: &RunRegistry, run_id: Uuid) -> RunStatus {
        for _ in 0..500 {
            let status = registry.status(run_id).await.unwrap();
            if status.summary.is_some() || status.error.is_some() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {run_id} never finished");
    }

    #[tokio::test]
    async fn test_registered_run_reports_summary() {
        let sink = Arc::new(MemorySink::new());
        let pipeline = IngestPipeline::new(PipelineConfig::default(), sink.clone()).unwrap();
        let registry = RunRegistry::new();

        let handle = pipeline.start_reader(csv(12)).await.unwrap();
        let run_id = registry.register("people.csv", handle).await;

        let status = wait_until_done(&registry, run_id).await;
        assert_eq!(status.file, "people.csv");
        assert_eq!(status.state, PipelineState::Done);
        assert_eq!(status.summary.unwrap().records_written, 12);
        assert!(status.finished_at.is_some());
        assert_eq!(registry.active().await, 0);
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_only_recent_finished_runs_are_kept() {
        let sink = Arc::new(MemorySink::new());
        let pipeline = IngestPipeline::new(PipelineConfig::default(), sink.clone()).unwrap();
        let registry = RunRegistry::with_retention(2);

        let mut run_ids = Vec::new();
        for n in 0..4 {
            let handle = pipeline.start_reader(csv(3)).await.unwrap();
            let run_id = registry.register(format!("batch-{n}.csv"), handle).await;
            wait_until_done(&registry, run_id).await;
            run_ids.push(run_id);
        }

        let files: Vec<String> = registry.list().await.into_iter().map(|s| s.file).collect();
        assert_eq!(files, vec!["batch-3.csv", "batch-2.csv"]);
        assert!(registry.status(run_ids[0]).await.is_none());
        assert!(registry.status(run_ids[1]).await.is_none());
        assert_eq!(sink.len().await, 12);
    }

    #[tokio::test]
    async fn test_unknown_run() {
        assert!(RunRegistry::new().status(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_leaves_no_run_behind() {
        let sink = Arc::new(MemorySink::new());
        let config = PipelineConfig::default().with_batch_size(5).with_queue_capacity(1);
        let pipeline = IngestPipeline::new(config, sink.clone()).unwrap();
        let registry = RunRegistry::new();

        let first = registry
            .register("a.csv", pipeline.start_reader(csv(20_000)).await.unwrap())
            .await;
        let second = registry
            .register("b.csv", pipeline.start_reader(csv(20_000)).await.unwrap())
            .await;

        assert!(registry.shutdown(Duration::from_secs(10)).await);

        for run_id in [first, second] {
            let status = registry.status(run_id).await.unwrap();
            assert_eq!(status.state, PipelineState::Done);
            let summary = status.summary.unwrap();
            assert_eq!(summary.records_written, summary.batches_written * 5);
        }
        assert_eq!(registry.active().await, 0);
    }
}
