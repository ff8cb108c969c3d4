//! Embedded-relational provider backed by SQLite.
//!
//! Timestamps are stored as fixed-width RFC 3339 TEXT so `ORDER BY` on the
//! column is chronological. Top-N-per-run uses the same window-function
//! query as the networked variant.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use super::{
    check_info_key, check_run_ids, format_timestamp, parse_run_id, parse_timestamp, LogProvider,
};
use crate::config::{SqliteConfig, TableNames};
use crate::record::{EventRecord, RunInfo, ThroughputSample};
use crate::{Error, Result};

/// Embedded-relational storage provider.
#[derive(Debug)]
pub struct SqliteLogProvider {
    config: SqliteConfig,
    tables: TableNames,
    pool: Option<SqlitePool>,
}

impl SqliteLogProvider {
    /// Create an unconnected provider after validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the database path is empty.
    pub fn new(config: SqliteConfig, tables: TableNames) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            tables,
            pool: None,
        })
    }

    fn pool(&self) -> Result<&SqlitePool> {
        self.pool
            .as_ref()
            .ok_or_else(|| Error::Storage("sqlite provider is not initialized".to_string()))
    }

    fn database_url(&self) -> String {
        if self.config.path.starts_with("sqlite:") {
            self.config.path.clone()
        } else {
            format!("sqlite://{}", self.config.path)
        }
    }
}

fn record_from_row(row: &SqliteRow) -> Result<EventRecord> {
    Ok(EventRecord {
        run_id: parse_run_id(&row.get::<String, _>("run_id"))?,
        key: row.get("key"),
        value: row.get("value"),
        timestamp: parse_timestamp(&row.get::<String, _>("timestamp"))?,
    })
}

fn sample_from_row(row: &SqliteRow) -> Result<ThroughputSample> {
    Ok(ThroughputSample {
        timestamp: parse_timestamp(&row.get::<String, _>("timestamp"))?,
        num_requests: row.get("num_requests"),
        request_type: row.get("request_type"),
    })
}

fn storage_err(context: &str, e: sqlx::Error) -> Error {
    Error::Storage(format!("{context}: {e}"))
}

#[async_trait]
impl LogProvider for SqliteLogProvider {
    async fn init(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }

        let url = self.database_url();
        let connect_opts = SqliteConnectOptions::from_str(&url)
            .map_err(|e| Error::Configuration(format!("invalid sqlite path '{url}': {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        // In-memory databases give every connection its own database, so a
        // single connection is required for a consistent view.
        let max_connections: u32 = if url.contains(":memory:") { 1 } else { 5 };

        let pool = sqlx::pool::PoolOptions::<Sqlite>::new()
            .max_connections(max_connections)
            .connect_with(connect_opts)
            .await
            .map_err(|e| storage_err("failed to connect to sqlite", e))?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                timestamp TEXT NOT NULL,
                run_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL
            )",
            self.tables.logs
        ))
        .execute(&pool)
        .await
        .map_err(|e| storage_err("failed to create event log table", e))?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                timestamp TEXT NOT NULL,
                run_id TEXT PRIMARY KEY,
                log_type TEXT NOT NULL
            )",
            self.tables.run_info
        ))
        .execute(&pool)
        .await
        .map_err(|e| storage_err("failed to create run-info table", e))?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                timestamp TEXT NOT NULL,
                num_requests INTEGER NOT NULL,
                request_type TEXT NOT NULL
            )",
            self.tables.throughput
        ))
        .execute(&pool)
        .await
        .map_err(|e| storage_err("failed to create throughput table", e))?;

        self.pool = Some(pool);
        Ok(())
    }

    async fn log(
        &mut self,
        run_id: Uuid,
        key: &str,
        value: &str,
        is_info_log: bool,
    ) -> Result<()> {
        if is_info_log {
            check_info_key(key)?;
        }
        let pool = self.pool()?;
        let now = format_timestamp(Utc::now());

        if is_info_log {
            // Latest info write wins: the run-info row is keyed by run_id.
            sqlx::query(&format!(
                "INSERT INTO {} (timestamp, run_id, log_type) VALUES (?, ?, ?)
                 ON CONFLICT(run_id) DO UPDATE SET
                     timestamp = excluded.timestamp,
                     log_type = excluded.log_type",
                self.tables.run_info
            ))
            .bind(&now)
            .bind(run_id.to_string())
            .bind(value)
            .execute(pool)
            .await
            .map_err(|e| storage_err("failed to write info record", e))?;
        } else {
            sqlx::query(&format!(
                "INSERT INTO {} (timestamp, run_id, key, value) VALUES (?, ?, ?, ?)",
                self.tables.logs
            ))
            .bind(&now)
            .bind(run_id.to_string())
            .bind(key)
            .bind(value)
            .execute(pool)
            .await
            .map_err(|e| storage_err("failed to write event record", e))?;
        }
        Ok(())
    }

    async fn get_run_info(
        &mut self,
        limit: usize,
        log_type_filter: Option<&str>,
    ) -> Result<Vec<RunInfo>> {
        let pool = self.pool()?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT run_id, log_type FROM {} ",
            self.tables.run_info
        ));
        if let Some(filter) = log_type_filter {
            qb.push("WHERE log_type = ");
            qb.push_bind(filter.to_string());
            qb.push(" ");
        }
        qb.push("ORDER BY timestamp DESC LIMIT ");
        qb.push_bind(limit as i64);

        let rows = qb
            .build()
            .fetch_all(pool)
            .await
            .map_err(|e| storage_err("failed to read run info", e))?;

        rows.iter()
            .map(|row| {
                Ok(RunInfo {
                    run_id: parse_run_id(&row.get::<String, _>("run_id"))?,
                    log_type: row.get("log_type"),
                })
            })
            .collect()
    }

    async fn get_logs(
        &mut self,
        run_ids: &[Uuid],
        limit_per_run: usize,
    ) -> Result<Vec<EventRecord>> {
        check_run_ids(run_ids)?;
        let pool = self.pool()?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT timestamp, run_id, key, value FROM (
                SELECT timestamp, run_id, key, value,
                       ROW_NUMBER() OVER (PARTITION BY run_id ORDER BY timestamp DESC) AS rn
                FROM {} WHERE run_id IN (",
            self.tables.logs
        ));
        let mut sep = qb.separated(", ");
        for run_id in run_ids {
            sep.push_bind(run_id.to_string());
        }
        sep.push_unseparated(")) WHERE rn <= ");
        qb.push_bind(limit_per_run as i64);
        qb.push(" ORDER BY timestamp DESC");

        let rows = qb
            .build()
            .fetch_all(pool)
            .await
            .map_err(|e| storage_err("failed to read event records", e))?;

        rows.iter().map(record_from_row).collect()
    }

    async fn log_throughput(
        &mut self,
        timestamp: DateTime<Utc>,
        num_requests: i64,
        request_type: &str,
    ) -> Result<()> {
        let pool = self.pool()?;
        sqlx::query(&format!(
            "INSERT INTO {} (timestamp, num_requests, request_type) VALUES (?, ?, ?)",
            self.tables.throughput
        ))
        .bind(format_timestamp(timestamp))
        .bind(num_requests)
        .bind(request_type)
        .execute(pool)
        .await
        .map_err(|e| storage_err("failed to write throughput sample", e))?;
        Ok(())
    }

    async fn get_throughput_data(
        &mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ThroughputSample>> {
        let pool = self.pool()?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT timestamp, num_requests, request_type FROM {}",
            self.tables.throughput
        ));
        if let (Some(start), Some(end)) = (start, end) {
            qb.push(" WHERE timestamp BETWEEN ");
            qb.push_bind(format_timestamp(start));
            qb.push(" AND ");
            qb.push_bind(format_timestamp(end));
        }

        let rows = qb
            .build()
            .fetch_all(pool)
            .await
            .map_err(|e| storage_err("failed to read throughput samples", e))?;

        rows.iter().map(sample_from_row).collect()
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
        Ok(())
    }
}
