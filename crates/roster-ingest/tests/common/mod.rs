//! Shared fixtures for the pipeline integration tests
//!
//! - CSV builders with a header row and deterministic employee rows
//! - Sinks that fail or block on demand
//! - A tracing layer that captures events so tests can assert on logs

#![allow(dead_code)]

use async_trait::async_trait;
use roster_ingest::{Employee, MemorySink, RecordSink, SinkError};
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::watch;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

pub const HEADER: &str =
    "first_name,last_name,email,age,gender,department,company,salary,date_joined,is_active";

/// One well-formed data row; `n` makes every field unique enough to compare
pub fn employee_row(n: usize) -> String {
    format!(
        "First{n},Last{n},user{n}@example.com,{},{},Dept{},Company{},{}.5,2020-01-{:02},{}",
        18 + n % 50,
        if n % 2 == 0 { "Female" } else { "Male" },
        n % 7,
        n % 3,
        30_000 + n,
        1 + n % 28,
        if n % 3 == 0 { "false" } else { "true" },
    )
}

/// The record `employee_row(n)` parses into
pub fn expected_employee(n: usize) -> Employee {
    Employee {
        first_name: format!("First{n}"),
        last_name: format!("Last{n}"),
        email: format!("user{n}@example.com"),
        age: (18 + n % 50) as i32,
        gender: if n % 2 == 0 { "Female" } else { "Male" }.to_string(),
        department: format!("Dept{}", n % 7),
        company: format!("Company{}", n % 3),
        salary: (30_000 + n) as f64 + 0.5,
        date_joined: format!("2020-01-{:02}", 1 + n % 28),
        is_active: n % 3 != 0,
    }
}

/// Header followed by the given data lines
pub fn csv_from_lines(lines: impl IntoIterator<Item = String>) -> String {
    let mut data = String::from(HEADER);
    data.push('\n');
    for line in lines {
        data.push_str(&line);
        data.push('\n');
    }
    data
}

/// Header followed by `rows` well-formed rows numbered from 1
pub fn employee_csv(rows: usize) -> String {
    csv_from_lines((1..=rows).map(employee_row))
}

pub fn reader(data: String) -> Cursor<Vec<u8>> {
    Cursor::new(data.into_bytes())
}

/// Serves `data`, then fails every further read as if the device went away
pub struct FailingReader {
    data: Vec<u8>,
    pos: usize,
}

impl FailingReader {
    pub fn new(data: String) -> Self {
        Self {
            data: data.into_bytes(),
            pos: 0,
        }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let pos = self.pos;
        if pos >= self.data.len() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device detached",
            )));
        }

        let n = (self.data.len() - pos).min(buf.remaining());
        buf.put_slice(&self.data[pos..pos + n]);
        self.pos += n;
        Poll::Ready(Ok(()))
    }
}

/// Sort key so write-completion order does not matter in comparisons
pub fn sorted_by_email(mut records: Vec<Employee>) -> Vec<Employee> {
    records.sort_by(|a, b| a.email.cmp(&b.email));
    records
}

/// Rejects any batch that contains the poisoned email
pub struct PoisonSink {
    pub inner: MemorySink,
    poison: String,
}

impl PoisonSink {
    pub fn new(poison: impl Into<String>) -> Self {
        Self {
            inner: MemorySink::new(),
            poison: poison.into(),
        }
    }
}

#[async_trait]
impl RecordSink for PoisonSink {
    async fn bulk_insert(&self, records: &[Employee]) -> Result<(), SinkError> {
        if records.iter().any(|r| r.email == self.poison) {
            return Err(SinkError::Rejected(format!("constraint violated by {}", self.poison)));
        }
        self.inner.bulk_insert(records).await
    }

    fn name(&self) -> &str {
        "poison"
    }
}

/// Holds every write until the gate is opened
pub struct GatedSink {
    pub inner: MemorySink,
    gate: watch::Receiver<bool>,
    waiting: AtomicUsize,
}

impl GatedSink {
    /// Returns the sink and the sender that opens the gate
    pub fn closed() -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let sink = Self {
            inner: MemorySink::new(),
            gate: rx,
            waiting: AtomicUsize::new(0),
        };
        (sink, tx)
    }

    /// Writes currently blocked on the gate
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSink for GatedSink {
    async fn bulk_insert(&self, records: &[Employee]) -> Result<(), SinkError> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.clone();
        let opened = gate.wait_for(|open| *open).await.is_ok();
        self.waiting.fetch_sub(1, Ordering::SeqCst);

        if !opened {
            return Err(SinkError::Rejected("gate dropped".to_string()));
        }
        self.inner.bulk_insert(records).await
    }

    fn name(&self) -> &str {
        "gated"
    }
}

/// One captured tracing event
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub message: String,
    pub fields: HashMap<String, String>,
}

/// Layer that records every event it sees
#[derive(Clone, Default)]
pub struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CaptureLayer {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.message == message)
            .collect()
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: HashMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields
                .insert(field.name().to_string(), format!("{value:?}"));
        }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        if let Ok(mut events) = self.events.lock() {
            events.push(CapturedEvent {
                level: *event.metadata().level(),
                message: visitor.message,
                fields: visitor.fields,
            });
        }
    }
}
