//! # Pipelog: Run-Scoped Key/Value Event Logging
//!
//! Pipelog instruments long-running pipeline executions by recording
//! discrete key/value events tagged with a run identifier, then answers
//! "what runs happened" and "what happened in run X", plus derived
//! analytics (error histograms, retrieval-score distributions, latency
//! samples, throughput trends) mined from the raw event stream.
//!
//! One storage contract, three backends with identical query semantics:
//! an embedded relational store (SQLite), a networked relational store
//! (Postgres), and a clustered key-value store (Redis).
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use pipelog::config::{LoggingConfig, SqliteConfig};
//! use pipelog::{PipelineLogger, ProviderRegistry};
//! use uuid::Uuid;
//!
//! # async fn example() -> pipelog::Result<()> {
//! let config = LoggingConfig::sqlite(SqliteConfig {
//!     path: "pipeline.sqlite".to_string(),
//! });
//! let logger = PipelineLogger::new(ProviderRegistry::with_config(config)?);
//!
//! let run_id = Uuid::new_v4();
//! logger.log(run_id, "pipeline_type", "rag", true).await;
//! logger.log(run_id, "search_query", "what is rust", false).await;
//!
//! let runs = logger.get_run_info(10, None).await?;
//! let records = logger.get_logs(&[run_id], 100).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod analytics;
pub mod config;
pub mod error;
pub mod facade;
pub mod provider;
pub mod record;
pub mod registry;

pub use analytics::LogAnalytics;
pub use error::{Error, Result};
pub use facade::PipelineLogger;
pub use record::{EventRecord, RunInfo, ThroughputSample};
pub use registry::ProviderRegistry;
