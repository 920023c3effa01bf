//! Ingestion orchestrator
//!
//! Drives one run through `Idle -> Streaming -> Draining -> Done`:
//!
//! 1. open the stream and discard the header row (failure here is the only
//!    fatal outcome, and no writer has been started yet)
//! 2. start the writer pool on a fresh bounded queue
//! 3. read, parse and batch rows, enqueueing full batches
//! 4. at end of stream flush the partial batch and close the queue
//! 5. wait for every writer to drain and exit
//!
//! Malformed rows and failed writes are logged and counted; once started a
//! run always reaches `Done`.

use csv_async::{AsyncReader, AsyncReaderBuilder, ByteRecord};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::batcher::{Batch, Batcher};
use crate::config::PipelineConfig;
use crate::error::IngestError;
use crate::pool::WriterPool;
use crate::queue::{work_queue, BatchSender, QueueClosed};
use crate::record::{RawRow, RecordParser};
use crate::sink::RecordSink;
use crate::stats::{RunStats, RunSummary};

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Streaming,
    Draining,
    Done,
}

impl PipelineState {
    pub fn as_str(&self) -> &str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Streaming => "streaming",
            PipelineState::Draining => "draining",
            PipelineState::Done => "done",
        }
    }
}

/// Why the read loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    EndOfStream,
    StreamFailed,
    Cancelled,
    WritersGone,
}

/// Streams delimited files into a [`RecordSink`]
#[derive(Clone)]
pub struct IngestPipeline {
    config: PipelineConfig,
    sink: Arc<dyn RecordSink>,
}

impl IngestPipeline {
    pub fn new(config: PipelineConfig, sink: Arc<dyn RecordSink>) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self { config, sink })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Ingest a file and wait for the run to finish
    pub async fn run(&self, path: impl AsRef<Path>) -> Result<RunSummary, IngestError> {
        self.start(path).await?.wait().await
    }

    /// Open a file, consume its header and schedule the run.
    ///
    /// Returns as soon as the run is spawned; open and header errors are
    /// returned here rather than through the handle.
    pub async fn start(&self, path: impl AsRef<Path>) -> Result<IngestHandle, IngestError> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| IngestError::StreamOpen {
                path: path.to_path_buf(),
                source,
            })?;

        info!(path = %path.display(), "Opened input file");
        self.start_reader(file).await
    }

    /// Ingest any async byte stream and wait for the run to finish
    pub async fn run_reader<R>(&self, reader: R) -> Result<RunSummary, IngestError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        self.start_reader(reader).await?.wait().await
    }

    /// Like [`start`](Self::start), for an already-open stream
    pub async fn start_reader<R>(&self, reader: R) -> Result<IngestHandle, IngestError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("ingest_run", %run_id);

        let csv = open_stream(reader).instrument(span.clone()).await?;

        let (state_tx, state_rx) = watch::channel(PipelineState::Idle);
        let stats = Arc::new(RunStats::default());
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let run = Run {
            run_id,
            config: self.config.clone(),
            sink: Arc::clone(&self.sink),
            stats: Arc::clone(&stats),
            cancel: cancel.clone(),
            state: state_tx,
            started,
        };
        let task = tokio::spawn(run.execute(csv).instrument(span));

        Ok(IngestHandle {
            run_id,
            state: state_rx,
            stats,
            cancel,
            started,
            task,
        })
    }
}

/// Build the CSV reader and discard the header row
async fn open_stream<R>(reader: R) -> Result<AsyncReader<R>, IngestError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut csv = AsyncReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .create_reader(reader);

    // Header content is never looked at, so read it as bytes
    let mut header = ByteRecord::new();
    if !csv.read_byte_record(&mut header).await? {
        return Err(IngestError::MissingHeader);
    }
    debug!(columns = header.len(), "Discarded header row");

    Ok(csv)
}

/// Handle to a scheduled run
pub struct IngestHandle {
    run_id: Uuid,
    state: watch::Receiver<PipelineState>,
    stats: Arc<RunStats>,
    cancel: CancellationToken,
    started: Instant,
    task: JoinHandle<RunSummary>,
}

impl IngestHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.clone()
    }

    /// Live counters; final once the state is `Done`
    pub fn progress(&self) -> RunSummary {
        self.stats
            .snapshot(self.run_id, self.started.elapsed().as_millis() as u64)
    }

    /// Ask the run to stop reading.
    ///
    /// Batches already queued are still written; the open partial batch is
    /// discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to reach `Done`
    pub async fn wait(self) -> Result<RunSummary, IngestError> {
        self.task
            .await
            .map_err(|e| IngestError::RunAborted(e.to_string()))
    }
}

/// Everything one spawned run owns
struct Run {
    run_id: Uuid,
    config: PipelineConfig,
    sink: Arc<dyn RecordSink>,
    stats: Arc<RunStats>,
    cancel: CancellationToken,
    state: watch::Sender<PipelineState>,
    started: Instant,
}

impl Run {
    async fn execute<R>(self, mut csv: AsyncReader<R>) -> RunSummary
    where
        R: AsyncRead + Unpin + Send,
    {
        info!(
            workers = self.config.worker_count,
            batch_size = self.config.batch_size,
            queue_capacity = self.config.queue_capacity,
            sink = self.sink.name(),
            "Ingestion run started"
        );

        let (sender, receiver) = work_queue(self.config.queue_capacity);
        let pool = WriterPool::start(
            self.config.worker_count,
            receiver,
            Arc::clone(&self.sink),
            Arc::clone(&self.stats),
        );
        self.transition(PipelineState::Streaming);

        let parser = RecordParser::new(self.config.leading_columns);
        let mut batcher = Batcher::new(self.config.batch_size);
        let mut raw = RawRow::new();
        let mut row: u64 = 0;

        let stop = loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break StopReason::Cancelled,
                read = csv.read_record(&mut raw) => read,
            };

            match read {
                Ok(false) => break StopReason::EndOfStream,
                Ok(true) => {
                    row += 1;
                    self.stats.row_read();

                    match parser.parse(row, &raw) {
                        Ok(employee) => {
                            self.stats.record_parsed();
                            if let Some(batch) = batcher.append(employee) {
                                if let Err(reason) = self.enqueue(&sender, batch).await {
                                    break reason;
                                }
                            }
                        },
                        Err(e) => {
                            self.stats.row_failed();
                            warn!(row = e.row, error = %e.cause, "Skipping malformed row");
                        },
                    }
                },
                Err(e) => {
                    row += 1;
                    self.stats.row_read();
                    self.stats.row_failed();
                    warn!(row, error = %e, "Failed to read row");

                    if matches!(e.kind(), csv_async::ErrorKind::Io(_)) {
                        error!(row, error = %e, "Input stream failed, no further rows will be read");
                        break StopReason::StreamFailed;
                    }
                },
            }
        };

        self.transition(PipelineState::Draining);

        match stop {
            StopReason::EndOfStream | StopReason::StreamFailed => {
                if let Some(batch) = batcher.flush() {
                    // A cancellation or pool loss here is logged inside enqueue
                    let _ = self.enqueue(&sender, batch).await;
                }
            },
            StopReason::Cancelled | StopReason::WritersGone => {
                if stop == StopReason::Cancelled {
                    self.stats.mark_cancelled();
                    warn!(rows_read = row, "Ingestion run cancelled, closing queue");
                }
                let pending = batcher.pending();
                if pending > 0 {
                    warn!(records = pending, "Discarding partial batch");
                }
            },
        }

        sender.close();
        drop(csv);

        let reports = pool.join().await;
        debug!(writers = reports.len(), "All writers exited");

        self.transition(PipelineState::Done);

        let summary = self
            .stats
            .snapshot(self.run_id, self.started.elapsed().as_millis() as u64);
        info!(
            rows_read = summary.rows_read,
            rows_failed = summary.rows_failed,
            batches_written = summary.batches_written,
            batches_failed = summary.batches_failed,
            records_written = summary.records_written,
            cancelled = summary.cancelled,
            elapsed_ms = summary.elapsed_ms,
            "Ingestion run completed"
        );

        summary
    }

    /// Enqueue a batch, giving up if the run is cancelled or no writer is left
    async fn enqueue(&self, sender: &BatchSender, batch: Batch) -> Result<(), StopReason> {
        let sequence = batch.sequence;
        let records = batch.len();

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.stats.mark_cancelled();
                warn!(batch = sequence, records, "Run cancelled while waiting for queue space, batch dropped");
                Err(StopReason::Cancelled)
            },
            result = sender.enqueue(batch) => match result {
                Ok(()) => {
                    self.stats.batch_enqueued();
                    debug!(batch = sequence, records, queued = sender.queued(), "Enqueued batch");
                    Ok(())
                },
                Err(QueueClosed(batch)) => {
                    self.stats.batch_failed(batch.len());
                    error!(batch = sequence, records, "No writers left to take batch, stopping read");
                    Err(StopReason::WritersGone)
                },
            },
        }
    }

    fn transition(&self, next: PipelineState) {
        let previous = self.state.send_replace(next);
        info!(from = previous.as_str(), to = next.as_str(), "Pipeline state changed");
    }
}
