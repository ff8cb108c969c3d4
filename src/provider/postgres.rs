//! Networked-relational provider backed by Postgres.
//!
//! Uses native `TIMESTAMPTZ` and `UUID` columns; otherwise identical in
//! observable behavior to the embedded variant, including the
//! window-function top-N-per-run query.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::{check_info_key, check_run_ids, LogProvider};
use crate::config::{PostgresConfig, TableNames};
use crate::record::{EventRecord, RunInfo, ThroughputSample};
use crate::{Error, Result};

/// Networked-relational storage provider.
#[derive(Debug)]
pub struct PostgresLogProvider {
    config: PostgresConfig,
    tables: TableNames,
    pool: Option<PgPool>,
}

impl PostgresLogProvider {
    /// Create an unconnected provider after validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if any connection parameter is empty.
    pub fn new(config: PostgresConfig, tables: TableNames) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            tables,
            pool: None,
        })
    }

    fn pool(&self) -> Result<&PgPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| Error::Storage("postgres provider is not initialized".to_string()))
    }
}

fn record_from_row(row: &PgRow) -> EventRecord {
    EventRecord {
        run_id: row.get("run_id"),
        key: row.get("key"),
        value: row.get("value"),
        timestamp: row.get("timestamp"),
    }
}

fn sample_from_row(row: &PgRow) -> ThroughputSample {
    ThroughputSample {
        timestamp: row.get("timestamp"),
        num_requests: row.get("num_requests"),
        request_type: row.get("request_type"),
    }
}

fn storage_err(context: &str, e: sqlx::Error) -> Error {
    Error::Storage(format!("{context}: {e}"))
}

#[async_trait]
impl LogProvider for PostgresLogProvider {
    async fn init(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Ok(());
        }

        let connect_opts = PgConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.user)
            .password(&self.config.password)
            .database(&self.config.dbname);

        let pool = sqlx::pool::PoolOptions::<Postgres>::new()
            .max_connections(5)
            .connect_with(connect_opts)
            .await
            .map_err(|e| storage_err("failed to connect to postgres", e))?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                timestamp TIMESTAMPTZ NOT NULL,
                run_id UUID NOT NULL,
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
                timestamp TIMESTAMPTZ NOT NULL,
                run_id UUID PRIMARY KEY,
                log_type TEXT NOT NULL
            )",
            self.tables.run_info
        ))
        .execute(&pool)
        .await
        .map_err(|e| storage_err("failed to create run-info table", e))?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                timestamp TIMESTAMPTZ NOT NULL,
                num_requests BIGINT NOT NULL,
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
        let now = Utc::now();

        if is_info_log {
            // Latest info write wins: the run-info row is keyed by run_id.
            sqlx::query(&format!(
                "INSERT INTO {} (timestamp, run_id, log_type) VALUES ($1, $2, $3)
                 ON CONFLICT (run_id) DO UPDATE SET
                     timestamp = EXCLUDED.timestamp,
                     log_type = EXCLUDED.log_type",
                self.tables.run_info
            ))
            .bind(now)
            .bind(run_id)
            .bind(value)
            .execute(pool)
            .await
            .map_err(|e| storage_err("failed to write info record", e))?;
        } else {
            sqlx::query(&format!(
                "INSERT INTO {} (timestamp, run_id, key, value) VALUES ($1, $2, $3, $4)",
                self.tables.logs
            ))
            .bind(now)
            .bind(run_id)
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

        let mut qb = QueryBuilder::<Postgres>::new(format!(
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

        Ok(rows
            .iter()
            .map(|row| RunInfo {
                run_id: row.get("run_id"),
                log_type: row.get("log_type"),
            })
            .collect())
    }

    async fn get_logs(
        &mut self,
        run_ids: &[Uuid],
        limit_per_run: usize,
    ) -> Result<Vec<EventRecord>> {
        check_run_ids(run_ids)?;
        let pool = self.pool()?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT timestamp, run_id, key, value FROM (
                SELECT timestamp, run_id, key, value,
                       ROW_NUMBER() OVER (PARTITION BY run_id ORDER BY timestamp DESC) AS rn
                FROM {} WHERE run_id IN (",
            self.tables.logs
        ));
        let mut sep = qb.separated(", ");
        for run_id in run_ids {
            sep.push_bind(*run_id);
        }
        sep.push_unseparated(")) sub WHERE sub.rn <= ");
        qb.push_bind(limit_per_run as i64);
        qb.push(" ORDER BY sub.timestamp DESC");

        let rows = qb
            .build()
            .fetch_all(pool)
            .await
            .map_err(|e| storage_err("failed to read event records", e))?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn log_throughput(
        &mut self,
        timestamp: DateTime<Utc>,
        num_requests: i64,
        request_type: &str,
    ) -> Result<()> {
        let pool = self.pool()?;
        sqlx::query(&format!(
            "INSERT INTO {} (timestamp, num_requests, request_type) VALUES ($1, $2, $3)",
            self.tables.throughput
        ))
        .bind(timestamp)
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

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT timestamp, num_requests, request_type FROM {}",
            self.tables.throughput
        ));
        if let (Some(start), Some(end)) = (start, end) {
            qb.push(" WHERE timestamp BETWEEN ");
            qb.push_bind(start);
            qb.push(" AND ");
            qb.push_bind(end);
        }

        let rows = qb
            .build()
            .fetch_all(pool)
            .await
            .map_err(|e| storage_err("failed to read throughput samples", e))?;

        Ok(rows.iter().map(sample_from_row).collect())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
        Ok(())
    }
}
