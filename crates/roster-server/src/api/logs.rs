//! Log analysis over the server's JSON log file
//!
//! The file is read line by line; each line is one JSON event as written by
//! the `json` log format (`timestamp`, `level`, `target`, flattened fields).
//! Lines that are not JSON objects are skipped and counted.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use roster_common::RosterError;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::io::ErrorKind;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use super::AppState;
use crate::error::AppError;

#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    /// `YYYY-MM-DD`, inclusive
    pub start_date: Option<NaiveDate>,
    /// `YYYY-MM-DD`, inclusive of the whole day
    pub end_date: Option<NaiveDate>,
    pub level: Option<String>,
    pub source: Option<String>,
}

/// Predicate built from a [`LogQuery`]
#[derive(Debug, Default)]
pub struct LogFilter {
    from: Option<DateTime<Utc>>,
    /// Exclusive
    until: Option<DateTime<Utc>>,
    level: Option<String>,
    source: Option<String>,
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

impl LogFilter {
    pub fn new(query: &LogQuery) -> Self {
        Self {
            from: query.start_date.map(midnight_utc),
            until: query.end_date.and_then(|date| date.succ_opt()).map(midnight_utc),
            level: non_empty(&query.level),
            source: non_empty(&query.source),
        }
    }

    fn filters_by_time(&self) -> bool {
        self.from.is_some() || self.until.is_some()
    }

    pub fn matches(&self, entry: &Map<String, Value>) -> bool {
        if let Some(level) = &self.level {
            let Some(entry_level) = entry.get("level").and_then(Value::as_str) else {
                return false;
            };
            if !entry_level.eq_ignore_ascii_case(level) {
                return false;
            }
        }

        if self.filters_by_time() {
            let Some(timestamp) = entry_timestamp(entry) else {
                return false;
            };
            if self.from.is_some_and(|from| timestamp < from) {
                return false;
            }
            if self.until.is_some_and(|until| timestamp >= until) {
                return false;
            }
        }

        if let Some(source) = &self.source {
            let Some(target) = entry.get("target").and_then(Value::as_str) else {
                return false;
            };
            // A module path matches its submodules too
            let nested = target
                .strip_prefix(source.as_str())
                .is_some_and(|rest| rest.starts_with("::"));
            if target != source && !nested {
                return false;
            }
        }

        true
    }
}

fn entry_timestamp(entry: &Map<String, Value>) -> Option<DateTime<Utc>> {
    let raw = entry
        .get("timestamp")
        .or_else(|| entry.get("time"))
        .and_then(Value::as_str)?;

    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// `GET /logs?start_date&end_date&level&source`
pub async fn analyze_logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Value>, AppError> {
    let filter = LogFilter::new(&query);

    let file = match tokio::fs::File::open(&state.log_file).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(RosterError::NotFound(format!(
                "Log file {} not found",
                state.log_file.display()
            ))
            .into());
        },
        Err(e) => return Err(e.into()),
    };

    let mut lines = BufReader::new(file).lines();
    let mut logs = Vec::new();
    let mut skipped = 0u64;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(&line) {
            Ok(Value::Object(entry)) => {
                if filter.matches(&entry) {
                    logs.push(Value::Object(entry));
                }
            },
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(skipped, file = %state.log_file.display(), "Skipped malformed log lines");
    }

    Ok(Json(json!({ "logs": logs, "skipped": skipped })))
}
