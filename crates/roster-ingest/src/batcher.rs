//! Groups parsed records into fixed-size batches
//!
//! Runs only on the reading path, so it holds plain owned state.

use crate::record::Employee;

/// Records written to the sink in one bulk call
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// 1-based position in the run, for log correlation
    pub sequence: u64,
    /// Records in input row order
    pub records: Vec<Employee>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Accumulates records until `capacity` is reached
#[derive(Debug)]
pub struct Batcher {
    capacity: usize,
    open: Vec<Employee>,
    emitted: u64,
}

impl Batcher {
    /// `capacity` must be non-zero; [`PipelineConfig::validate`](crate::PipelineConfig::validate) enforces it.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            open: Vec::with_capacity(capacity),
            emitted: 0,
        }
    }

    /// Add a record; returns the batch it completed, if any
    pub fn append(&mut self, record: Employee) -> Option<Batch> {
        self.open.push(record);
        if self.open.len() >= self.capacity {
            let records = std::mem::replace(&mut self.open, Vec::with_capacity(self.capacity));
            Some(self.seal(records))
        } else {
            None
        }
    }

    /// Hand over the remaining partial batch at end of stream
    pub fn flush(mut self) -> Option<Batch> {
        if self.open.is_empty() {
            return None;
        }
        let records = std::mem::take(&mut self.open);
        Some(self.seal(records))
    }

    /// Records absorbed but not yet emitted
    pub fn pending(&self) -> usize {
        self.open.len()
    }

    /// Batches emitted so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn seal(&mut self, records: Vec<Employee>) -> Batch {
        self.emitted += 1;
        Batch {
            sequence: self.emitted,
            records,
        }
    }
}
