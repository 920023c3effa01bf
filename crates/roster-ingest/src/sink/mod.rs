//! Storage sinks
//!
//! The pipeline persists records through [`RecordSink`] only. A sink is
//! shared by every writer, so `bulk_insert` must be safe to call from
//! `worker_count` tasks at once; locking and transactions are the sink's
//! business.

use async_trait::async_trait;
use thiserror::Error;

use crate::record::Employee;

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use memory::MemorySink;
#[cfg(feature = "database")]
pub use postgres::PgSink;

/// Why a bulk write failed
#[derive(Error, Debug)]
pub enum SinkError {
    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Write rejected: {0}")]
    Rejected(String),
}

/// Bulk-write destination for parsed records
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist the whole slice in one call
    async fn bulk_insert(&self, records: &[Employee]) -> Result<(), SinkError>;

    /// Short label for logs
    fn name(&self) -> &str;
}
