//! Error types for the ingestion pipeline
//!
//! Only [`IngestError`] ever escapes a run. Row and batch failures are
//! reported through the log and counted in the run summary.

use std::num::{ParseFloatError, ParseIntError};
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors: the run either never started or could not report back
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to open input stream {path}: {source}")]
    StreamOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read header row: {0}")]
    HeaderRead(#[from] csv_async::Error),

    #[error("Input stream is empty, expected a header row")]
    MissingHeader,

    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("Ingestion run aborted: {0}")]
    RunAborted(String),
}

/// A single data row that could not be turned into an [`Employee`](crate::Employee)
#[derive(Error, Debug)]
#[error("row {row}: {cause}")]
pub struct RowParseError {
    /// 1-based data row number; the header is not counted
    pub row: u64,
    #[source]
    pub cause: FieldError,
}

/// Field-level cause of a [`RowParseError`]
#[derive(Error, Debug)]
pub enum FieldError {
    #[error("expected at least {expected} fields, found {found}")]
    MissingFields { expected: usize, found: usize },

    #[error("field '{field}' is not an integer: {value:?}")]
    InvalidInteger {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("field '{field}' is not a number: {value:?}")]
    InvalidFloat {
        field: &'static str,
        value: String,
        #[source]
        source: ParseFloatError,
    },

    #[error("field '{field}' is out of range: {value:?}")]
    OutOfRange { field: &'static str, value: String },

    #[error("unreadable row: {0}")]
    Read(#[from] csv_async::Error),
}
