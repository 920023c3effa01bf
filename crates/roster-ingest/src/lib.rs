//! Roster Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Streaming bulk ingestion of employee CSV exports.
//!
//! A single reader parses rows into [`Employee`] records and groups them
//! into [`Batch`]es; a bounded queue hands the batches to a fixed pool of
//! writers that bulk-insert them into a [`RecordSink`]. Memory stays bounded
//! by `queue_capacity x batch_size` records however large the input is.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use roster_ingest::{IngestPipeline, MemorySink, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let sink = Arc::new(MemorySink::new());
//!     let pipeline = IngestPipeline::new(PipelineConfig::default(), sink)?;
//!     let summary = pipeline.run("./uploads/employees.csv").await?;
//!     println!("{} records written", summary.records_written);
//!     Ok(())
//! }
//! ```

pub mod batcher;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod queue;
pub mod record;
pub mod sink;
pub mod stats;

// Re-export commonly used types
pub use batcher::{Batch, Batcher};
pub use config::PipelineConfig;
pub use error::{FieldError, IngestError, RowParseError};
pub use pipeline::{IngestHandle, IngestPipeline, PipelineState};
pub use record::{Employee, RawRow, RecordParser};
pub use sink::{MemorySink, RecordSink, SinkError};
#[cfg(feature = "database")]
pub use sink::PgSink;
pub use stats::RunSummary;
