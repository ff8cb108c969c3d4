//! Storage provider contract and backend factory.
//!
//! One logical contract over three structurally different stores: an
//! embedded relational database, a networked relational database, and a
//! clustered key-value store. All three expose identical query semantics
//! (most-recent-N per run, newest-first ordering, exact type filtering)
//! even though the relational variants get top-N-per-run from a window
//! function while the KV variant simulates it with one bounded list read
//! per run.

mod postgres;
mod redis;
mod sqlite;

pub use postgres::PostgresLogProvider;
pub use redis::RedisLogProvider;
pub use sqlite::SqliteLogProvider;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::config::{LoggingConfig, StoreConfig};
use crate::record::{EventRecord, RunInfo, ThroughputSample};
use crate::{Error, Result};

/// Substring every info-record key must carry.
pub(crate) const INFO_KEY_MARKER: &str = "type";

/// Backend-specific implementation of the logging storage contract.
///
/// A provider owns its physical connection for the duration of a single
/// logical operation: callers acquire a fresh instance, run one operation,
/// and release it with [`close`](LogProvider::close) on every exit path.
#[async_trait]
pub trait LogProvider: Send + Sync + std::fmt::Debug {
    /// Connect and idempotently ensure the three logical tables/namespaces
    /// exist (event log, run-info, throughput). Calling `init` on an
    /// already-connected provider is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backing store is unreachable.
    async fn init(&mut self) -> Result<()>;

    /// Append one event record.
    ///
    /// Info records (`is_info_log = true`) update the most-recent-per-run
    /// index instead of the event log: a later info write for the same run
    /// replaces the earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`], without touching storage, if
    /// `is_info_log` is set and `key` does not contain `"type"`, or
    /// [`Error::Storage`] on write failure.
    async fn log(&mut self, run_id: Uuid, key: &str, value: &str, is_info_log: bool)
        -> Result<()>;

    /// Return up to `limit` run-metadata entries, newest-first by info-record
    /// write time, optionally restricted to an exact `log_type` match.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on read failure.
    async fn get_run_info(
        &mut self,
        limit: usize,
        log_type_filter: Option<&str>,
    ) -> Result<Vec<RunInfo>>;

    /// For each run in `run_ids`, return at most `limit_per_run` records,
    /// newest-first within that run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `run_ids` is empty, or
    /// [`Error::Storage`] on read failure.
    async fn get_logs(&mut self, run_ids: &[Uuid], limit_per_run: usize)
        -> Result<Vec<EventRecord>>;

    /// Append one throughput sample.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on write failure.
    async fn log_throughput(
        &mut self,
        timestamp: DateTime<Utc>,
        num_requests: i64,
        request_type: &str,
    ) -> Result<()>;

    /// Read the throughput series, restricted to the closed interval
    /// `[start, end]` when both bounds are given. A single bound is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on read failure.
    async fn get_throughput_data(
        &mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ThroughputSample>>;

    /// Release the backing connection. Safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the release itself fails.
    async fn close(&mut self) -> Result<()>;
}

/// Build an unconnected provider for the configured backend variant.
///
/// The caller (normally the registry) is expected to `init()` the returned
/// provider before use.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if the variant's parameters are invalid.
pub fn build_provider(config: &LoggingConfig) -> Result<Box<dyn LogProvider>> {
    match &config.store {
        StoreConfig::Sqlite(store) => Ok(Box::new(SqliteLogProvider::new(
            store.clone(),
            config.tables.clone(),
        )?)),
        StoreConfig::Postgres(store) => Ok(Box::new(PostgresLogProvider::new(
            store.clone(),
            config.tables.clone(),
        )?)),
        StoreConfig::Redis(store) => Ok(Box::new(RedisLogProvider::new(
            store.clone(),
            config.tables.clone(),
        )?)),
    }
}

/// Reject an info-record key that lacks the "type" marker.
pub(crate) fn check_info_key(key: &str) -> Result<()> {
    if key.contains(INFO_KEY_MARKER) {
        Ok(())
    } else {
        Err(Error::Validation(
            "info log keys must contain the text 'type'".to_string(),
        ))
    }
}

/// Reject an empty run-id set.
pub(crate) fn check_run_ids(run_ids: &[Uuid]) -> Result<()> {
    if run_ids.is_empty() {
        Err(Error::Validation("no run ids provided".to_string()))
    } else {
        Ok(())
    }
}

/// Fixed-width RFC 3339 with microsecond precision, so that lexicographic
/// order on the stored TEXT matches chronological order.
pub(crate) fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp stored by [`format_timestamp`].
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("invalid stored timestamp '{raw}': {e}")))
}

/// Parse a run id stored as canonical UUID text.
pub(crate) fn parse_run_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Storage(format!("invalid stored run id '{raw}': {e}")))
}
