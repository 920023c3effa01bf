//! Writer pool
//!
//! A fixed number of tasks, each looping `dequeue -> bulk_insert` until the
//! queue reports closed. A failed write is logged and the batch dropped;
//! the worker moves on to the next batch. Nothing is retried. A sink that
//! panics mid-write fails only the batch it was given.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, Instrument};

use crate::queue::BatchReceiver;
use crate::sink::{RecordSink, SinkError};
use crate::stats::RunStats;

/// What one worker did before exiting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub batches_written: u64,
    pub batches_failed: u64,
}

/// Handles to the running writers
pub struct WriterPool {
    handles: Vec<JoinHandle<WorkerReport>>,
}

impl WriterPool {
    /// Spawn `worker_count` writers draining `receiver` into `sink`
    pub fn start(
        worker_count: usize,
        receiver: BatchReceiver,
        sink: Arc<dyn RecordSink>,
        stats: Arc<RunStats>,
    ) -> Self {
        let handles = (0..worker_count)
            .map(|worker| {
                let receiver = receiver.clone();
                let sink = Arc::clone(&sink);
                let stats = Arc::clone(&stats);
                let span = tracing::info_span!("writer", worker);

                tokio::spawn(run_worker(receiver, sink, stats).instrument(span))
            })
            .collect();

        Self { handles }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every writer to exit.
    ///
    /// A writer that panicked is logged and counted as having done nothing;
    /// the others are still awaited.
    pub async fn join(self) -> Vec<WorkerReport> {
        let mut reports = Vec::with_capacity(self.handles.len());

        for (worker, handle) in self.handles.into_iter().enumerate() {
            match handle.await {
                Ok(report) => {
                    debug!(
                        worker,
                        batches_written = report.batches_written,
                        batches_failed = report.batches_failed,
                        "Writer finished"
                    );
                    reports.push(report);
                },
                Err(e) => {
                    error!(worker, error = %e, "Writer panicked");
                    reports.push(WorkerReport::default());
                },
            }
        }

        reports
    }
}

async fn run_worker(
    receiver: BatchReceiver,
    sink: Arc<dyn RecordSink>,
    stats: Arc<RunStats>,
) -> WorkerReport {
    let mut report = WorkerReport::default();

    while let Some(batch) = receiver.dequeue().await {
        let records = batch.len();

        let written = AssertUnwindSafe(sink.bulk_insert(&batch.records))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(SinkError::Rejected(format!(
                    "sink panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

        match written {
            Ok(()) => {
                stats.batch_written(records);
                report.batches_written += 1;
                info!(batch = batch.sequence, records, sink = sink.name(), "Inserted batch");
            },
            Err(e) => {
                stats.batch_failed(records);
                report.batches_failed += 1;
                error!(
                    batch = batch.sequence,
                    records,
                    sink = sink.name(),
                    error = %e,
                    "Failed to insert batch"
                );
            },
        }
    }

    report
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
