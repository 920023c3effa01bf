//! Pipeline configuration
//!
//! The three sizes that shape a run: how many writers, how many records per
//! bulk write, and how many batches may wait for a writer before the reader
//! is held back.

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

// ============================================================================
// Pipeline Defaults
// ============================================================================

/// Default number of concurrent writers.
pub const DEFAULT_WORKER_COUNT: usize = 10;

/// Default number of records per bulk write.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default number of full batches buffered ahead of the writers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Ingestion pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Degree of write parallelism
    pub worker_count: usize,
    /// Records per bulk write
    pub batch_size: usize,
    /// Batches buffered before the reader suspends
    pub queue_capacity: usize,
    /// Columns preceding first-name that the parser skips (e.g. a row id)
    #[serde(default)]
    pub leading_columns: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            leading_columns: 0,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// - `INGEST_WORKER_COUNT`
    /// - `INGEST_BATCH_SIZE`
    /// - `INGEST_QUEUE_CAPACITY`
    /// - `INGEST_LEADING_COLUMNS`
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Result<Self, IngestError> {
        let defaults = Self::default();

        let config = Self {
            worker_count: env_or("INGEST_WORKER_COUNT", defaults.worker_count),
            batch_size: env_or("INGEST_BATCH_SIZE", defaults.batch_size),
            queue_capacity: env_or("INGEST_QUEUE_CAPACITY", defaults.queue_capacity),
            leading_columns: env_or("INGEST_LEADING_COLUMNS", defaults.leading_columns),
        };

        config.validate()?;

        Ok(config)
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_leading_columns(mut self, leading_columns: usize) -> Self {
        self.leading_columns = leading_columns;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.worker_count == 0 {
            return Err(IngestError::InvalidConfig(
                "worker_count must be greater than 0".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(IngestError::InvalidConfig(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if self.queue_capacity == 0 {
            return Err(IngestError::InvalidConfig(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Upper bound on records parked in the queue, waiting for a writer
    pub fn max_buffered_records(&self) -> usize {
        self.queue_capacity * self.batch_size
    }
}

fn env_or(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
