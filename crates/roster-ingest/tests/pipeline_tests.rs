//! Integration tests for the ingestion pipeline
//!
//! These tests verify:
//! - Batch sizing and end-of-stream flushing
//! - Malformed rows are skipped without losing the rest of the file
//! - Unreadable rows and a failing stream keep what was already read
//! - A failed bulk write loses only its own batch
//! - The reader is held back while the writers are busy
//! - The header row never reaches the sink

mod common;

use common::*;
use roster_ingest::{
    IngestError, IngestPipeline, MemorySink, PipelineConfig, PipelineState, RecordSink,
};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

fn pipeline(sink: Arc<dyn RecordSink>, config: PipelineConfig) -> IngestPipeline {
    IngestPipeline::new(config, sink).unwrap()
}

#[tokio::test]
async fn test_batches_of_100_with_partial_tail() {
    let sink = Arc::new(MemorySink::new());
    let config = PipelineConfig::default()
        .with_worker_count(10)
        .with_batch_size(100);

    let handle = pipeline(sink.clone(), config)
        .start_reader(reader(employee_csv(250)))
        .await
        .unwrap();
    let mut states = handle.subscribe();
    let summary = handle.wait().await.unwrap();

    assert_eq!(*states.borrow_and_update(), PipelineState::Done);

    let mut sizes = sink.batch_sizes().await;
    sizes.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(sizes, vec![100, 100, 50]);

    let expected: Vec<_> = (1..=250).map(expected_employee).collect();
    assert_eq!(sorted_by_email(sink.records().await), sorted_by_email(expected));

    assert_eq!(summary.rows_read, 250);
    assert_eq!(summary.batches_enqueued, 3);
    assert_eq!(summary.batches_written, 3);
    assert_eq!(summary.records_written, 250);
    assert!(summary.is_clean());
}

#[tokio::test]
async fn test_exact_multiple_has_no_empty_tail() {
    let sink = Arc::new(MemorySink::new());
    let config = PipelineConfig::default().with_batch_size(50);

    let summary = pipeline(sink.clone(), config)
        .run_reader(reader(employee_csv(200)))
        .await
        .unwrap();

    assert_eq!(summary.batches_written, 4);
    assert!(sink.batch_sizes().await.iter().all(|&size| size == 50));
}

#[tokio::test]
async fn test_malformed_row_is_skipped_and_logged() {
    let capture = CaptureLayer::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

    let lines = (1..=100).map(|n| {
        if n == 50 {
            employee_row(n).replacen(&format!(",{},", 18 + n % 50), ",abc,", 1)
        } else {
            employee_row(n)
        }
    });

    let sink = Arc::new(MemorySink::new());
    let summary = pipeline(sink.clone(), PipelineConfig::default())
        .run_reader(reader(csv_from_lines(lines)))
        .await
        .unwrap();

    assert_eq!(summary.rows_read, 100);
    assert_eq!(summary.rows_failed, 1);
    assert_eq!(summary.records_written, 99);
    assert_eq!(sink.len().await, 99);
    assert!(!sink
        .records()
        .await
        .iter()
        .any(|e| e.email == "user50@example.com"));

    let skipped = capture.with_message("Skipping malformed row");
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].level, Level::WARN);
    assert_eq!(skipped[0].fields.get("row").map(String::as_str), Some("50"));
    assert!(skipped[0].fields["error"].contains("abc"));
}

#[tokio::test]
async fn test_short_row_and_bad_salary_are_skipped() {
    let lines = vec![
        employee_row(1),
        "Only,Three,Fields".to_string(),
        employee_row(3).replace("30003.5", "lots"),
        employee_row(4),
    ];

    let sink = Arc::new(MemorySink::new());
    let summary = pipeline(sink.clone(), PipelineConfig::default())
        .run_reader(reader(csv_from_lines(lines)))
        .await
        .unwrap();

    assert_eq!(summary.rows_failed, 2);
    assert_eq!(
        sorted_by_email(sink.records().await),
        vec![expected_employee(1), expected_employee(4)]
    );
}

#[tokio::test]
async fn test_unreadable_row_is_skipped_and_logged() {
    let capture = CaptureLayer::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

    // Row 2 is not valid UTF-8
    let mut data = format!("{HEADER}\n{}\n", employee_row(1)).into_bytes();
    data.extend_from_slice(b"B\xff,Broken,broken@example.com,30,Male,Ops,Acme,1.0,2020-01-01,true\n");
    data.extend_from_slice(format!("{}\n{}\n", employee_row(3), employee_row(4)).as_bytes());

    let sink = Arc::new(MemorySink::new());
    let summary = pipeline(sink.clone(), PipelineConfig::default())
        .run_reader(Cursor::new(data))
        .await
        .unwrap();

    assert_eq!(summary.rows_read, 4);
    assert_eq!(summary.rows_failed, 1);
    assert_eq!(
        sorted_by_email(sink.records().await),
        vec![expected_employee(1), expected_employee(3), expected_employee(4)]
    );

    let unreadable = capture.with_message("Failed to read row");
    assert_eq!(unreadable.len(), 1);
    assert_eq!(unreadable[0].level, Level::WARN);
    assert_eq!(unreadable[0].fields.get("row").map(String::as_str), Some("2"));
    assert!(capture
        .with_message("Input stream failed, no further rows will be read")
        .is_empty());
}

#[tokio::test]
async fn test_stream_failure_flushes_rows_already_read() {
    let capture = CaptureLayer::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

    let sink = Arc::new(MemorySink::new());
    let config = PipelineConfig::default()
        .with_worker_count(2)
        .with_batch_size(10);

    let handle = pipeline(sink.clone(), config)
        .start_reader(FailingReader::new(employee_csv(25)))
        .await
        .unwrap();
    let states = handle.subscribe();
    let summary = handle.wait().await.unwrap();

    assert_eq!(*states.borrow(), PipelineState::Done);

    // The partial tail of five is written even though the stream broke
    let mut sizes = sink.batch_sizes().await;
    sizes.sort_unstable();
    assert_eq!(sizes, vec![5, 10, 10]);
    let expected: Vec<_> = (1..=25).map(expected_employee).collect();
    assert_eq!(sorted_by_email(sink.records().await), sorted_by_email(expected));

    assert_eq!(summary.records_written, 25);
    assert_eq!(summary.rows_failed, 1);
    assert!(!summary.cancelled);

    let failed = capture.with_message("Input stream failed, no further rows will be read");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].level, Level::ERROR);
    assert!(failed[0].fields["error"].contains("device detached"));
}

#[tokio::test]
async fn test_header_only_writes_nothing() {
    let sink = Arc::new(MemorySink::new());
    let summary = pipeline(sink.clone(), PipelineConfig::default())
        .run_reader(reader(csv_from_lines(Vec::new())))
        .await
        .unwrap();

    assert_eq!(summary.rows_read, 0);
    assert_eq!(summary.batches_enqueued, 0);
    assert!(sink.is_empty().await);
    assert!(sink.batch_sizes().await.is_empty());
}

#[tokio::test]
async fn test_header_never_reaches_sink() {
    // A header that would parse cleanly as an employee
    let data = format!(
        "Head,Er,header@example.com,1,X,Y,Z,1.0,2000-01-01,true\n{}\n",
        employee_row(1)
    );

    let sink = Arc::new(MemorySink::new());
    let summary = pipeline(sink.clone(), PipelineConfig::default())
        .run_reader(reader(data))
        .await
        .unwrap();

    assert_eq!(summary.rows_read, 1);
    assert_eq!(sink.records().await, vec![expected_employee(1)]);
}

#[tokio::test]
async fn test_failed_write_loses_only_its_batch() {
    // Row 150 lands in the second batch of 100
    let sink = Arc::new(PoisonSink::new("user150@example.com"));
    let config = PipelineConfig::default().with_batch_size(100);

    let summary = pipeline(sink.clone(), config)
        .run_reader(reader(employee_csv(350)))
        .await
        .unwrap();

    assert_eq!(summary.batches_written, 3);
    assert_eq!(summary.batches_failed, 1);
    assert_eq!(summary.records_failed, 100);
    assert_eq!(summary.records_written, 250);
    assert!(!summary.is_clean());

    let written: HashSet<String> = sink.inner.records().await.into_iter().map(|e| e.email).collect();
    assert_eq!(written.len(), 250);
    for n in 1..=350 {
        let email = format!("user{n}@example.com");
        assert_eq!(written.contains(&email), !(101..=200).contains(&n), "row {n}");
    }
}

#[tokio::test]
async fn test_reader_is_held_back_by_busy_writers() {
    const WORKERS: usize = 2;
    const BATCH: usize = 10;
    const QUEUE: usize = 3;

    let (sink, gate) = GatedSink::closed();
    let sink = Arc::new(sink);
    let config = PipelineConfig::default()
        .with_worker_count(WORKERS)
        .with_batch_size(BATCH)
        .with_queue_capacity(QUEUE);

    let handle = pipeline(sink.clone(), config)
        .start_reader(reader(employee_csv(10_000)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let stalled = handle.progress();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let still_stalled = handle.progress();

    // One batch per busy writer, a full queue, and the batch the reader holds
    let bound = ((WORKERS + QUEUE + 1) * BATCH) as u64;
    assert!(stalled.records_parsed <= bound, "parsed {} > {bound}", stalled.records_parsed);
    assert_eq!(stalled.records_parsed, still_stalled.records_parsed);
    assert_eq!(sink.waiting(), WORKERS);
    assert_eq!(handle.state(), PipelineState::Streaming);

    gate.send_replace(true);
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.records_written, 10_000);
    assert_eq!(sink.inner.len().await, 10_000);
}

#[tokio::test]
async fn test_cancel_mid_run_drains_queued_batches() {
    let (sink, gate) = GatedSink::closed();
    let sink = Arc::new(sink);
    let config = PipelineConfig::default()
        .with_worker_count(1)
        .with_batch_size(10)
        .with_queue_capacity(2);

    let handle = pipeline(sink.clone(), config)
        .start_reader(reader(employee_csv(1_000)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();
    gate.send_replace(true);

    let summary = handle.wait().await.unwrap();

    assert!(summary.cancelled);
    assert!(summary.records_written < 1_000);
    assert_eq!(summary.records_written, summary.batches_written * 10);
    assert_eq!(sink.inner.len().await as u64, summary.records_written);
}

#[tokio::test]
async fn test_leading_id_column() {
    let lines = (1..=5).map(|n| format!("{n},{}", employee_row(n)));

    let sink = Arc::new(MemorySink::new());
    let config = PipelineConfig::default().with_leading_columns(1);
    let summary = pipeline(sink.clone(), config)
        .run_reader(reader(csv_from_lines(lines)))
        .await
        .unwrap();

    assert!(summary.is_clean());
    let expected: Vec<_> = (1..=5).map(expected_employee).collect();
    assert_eq!(sorted_by_email(sink.records().await), sorted_by_email(expected));
}

#[tokio::test]
async fn test_run_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(employee_csv(42).as_bytes()).unwrap();
    file.flush().unwrap();

    let sink = Arc::new(MemorySink::new());
    let summary = pipeline(sink.clone(), PipelineConfig::default())
        .run(file.path())
        .await
        .unwrap();

    assert_eq!(summary.records_written, 42);
    assert_eq!(sink.len().await, 42);
}

#[tokio::test]
async fn test_missing_file_fails_before_any_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.csv");

    let sink = Arc::new(MemorySink::new());
    let result = pipeline(sink.clone(), PipelineConfig::default())
        .run(&path)
        .await;

    match result {
        Err(IngestError::StreamOpen { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected StreamOpen, got {other:?}"),
    }
    assert!(sink.is_empty().await);
}

#[tokio::test]
async fn test_pipeline_is_reusable() {
    let sink = Arc::new(MemorySink::new());
    let pipeline = pipeline(sink.clone(), PipelineConfig::default());

    let first = pipeline.run_reader(reader(employee_csv(3))).await.unwrap();
    let second = pipeline.run_reader(reader(employee_csv(4))).await.unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(sink.len().await, 7);
}
