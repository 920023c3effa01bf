//! Roster Server Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! HTTP front end for employee CSV ingestion.
//!
//! # Overview
//!
//! - **Upload**: `POST /upload` saves the file and starts an ingestion run in
//!   the background; the response carries the run id
//! - **Runs**: `GET /runs/:run_id` reports the run's state and, once done,
//!   its summary
//! - **Records**: paginated and sorted reads, plus a total count
//! - **Logs**: filtered view of the server's own JSON log file
//!
//! Records are stored through an [`EmployeeStore`](store::EmployeeStore):
//! Postgres in production, process memory for local runs and tests.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use roster_ingest::MemorySink;
//! use roster_server::{api, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let state = api::AppState::new(
//!         Arc::new(MemorySink::new()),
//!         config.pipeline.clone(),
//!         &config.server.upload_dir,
//!         "./logs/roster-server.log",
//!     )?;
//!     let app = api::create_router(state, &config);
//!
//!     let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod runs;
pub mod store;

// Re-export commonly used types
pub use error::AppError;
