//! In-process sink
//!
//! Keeps every written batch in memory. Used by the CLI's dry-run mode, the
//! server when no database is configured, and the tests.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RecordSink, SinkError};
use crate::record::Employee;

#[derive(Debug, Default)]
pub struct MemorySink {
    batches: RwLock<Vec<Vec<Employee>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored records, batch by batch in write-completion order
    pub async fn records(&self) -> Vec<Employee> {
        self.batches.read().await.iter().flatten().cloned().collect()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.batches.read().await.iter().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Size of each successful bulk write, in completion order
    pub async fn batch_sizes(&self) -> Vec<usize> {
        self.batches.read().await.iter().map(Vec::len).collect()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn bulk_insert(&self, records: &[Employee]) -> Result<(), SinkError> {
        self.batches.write().await.push(records.to_vec());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
