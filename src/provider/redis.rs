//! Clustered key-value provider backed by Redis.
//!
//! The relational tables are approximated with three structures:
//! - events: one append-only list per run (`LPUSH` newest-first), read with
//!   a bounded `LRANGE` per run;
//! - run-info: a hash keyed by run id plus a write-time-scored sorted set,
//!   read with batched `ZREVRANGE` pagination;
//! - throughput: a write-time-scored sorted set, read with `ZRANGEBYSCORE`
//!   for the closed interval.
//!
//! Only per-command atomicity is available; there is no cross-command
//! transaction, so "latest info wins" is eventual under concurrent writers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{check_info_key, check_run_ids, LogProvider};
use crate::config::{RedisConfig, TableNames};
use crate::record::{EventRecord, RunInfo, ThroughputSample};
use crate::{Error, Result};

/// Run-info entries fetched per `ZREVRANGE` round trip.
const RUN_INFO_BATCH: isize = 100;

/// JSON payload stored for every event and run-info entry.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    timestamp: DateTime<Utc>,
    run_id: Uuid,
    key: String,
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_type: Option<String>,
}

/// JSON payload stored for every throughput sample.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSample {
    timestamp: DateTime<Utc>,
    num_requests: i64,
    request_type: String,
}

/// Clustered key-value storage provider.
#[derive(Debug)]
pub struct RedisLogProvider {
    config: RedisConfig,
    tables: TableNames,
    conn: Option<MultiplexedConnection>,
}

impl RedisLogProvider {
    /// Create an unconnected provider after validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the cluster host is empty.
    pub fn new(config: RedisConfig, tables: TableNames) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            tables,
            conn: None,
        })
    }

    fn run_list_key(&self, run_id: Uuid) -> String {
        format!("{}:{run_id}", self.tables.logs)
    }

    fn info_sorted_key(&self) -> String {
        format!("{}_sorted", self.tables.run_info)
    }
}

fn storage_err(context: &str, e: redis::RedisError) -> Error {
    Error::Storage(format!("{context}: {e}"))
}

fn not_initialized() -> Error {
    Error::Storage("redis provider is not initialized".to_string())
}

fn decode_entry(raw: &str) -> Result<StoredEntry> {
    serde_json::from_str(raw)
        .map_err(|e| Error::Storage(format!("corrupt stored entry '{raw}': {e}")))
}

#[async_trait]
impl LogProvider for RedisLogProvider {
    async fn init(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }

        // Keys materialize on first write, so init only has to connect.
        let url = format!("redis://{}:{}/", self.config.host, self.config.port);
        let client = redis::Client::open(url)
            .map_err(|e| Error::Configuration(format!("invalid redis address: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| storage_err("failed to connect to redis", e))?;

        self.conn = Some(conn);
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
        let list_key = self.run_list_key(run_id);
        let info_key = self.tables.run_info.clone();
        let sorted_key = self.info_sorted_key();
        let conn = self.conn.as_mut().ok_or_else(not_initialized)?;

        let now = Utc::now();
        let entry = StoredEntry {
            timestamp: now,
            run_id,
            key: key.to_string(),
            value: value.to_string(),
            log_type: is_info_log.then(|| value.to_string()),
        };
        let payload = serde_json::to_string(&entry)
            .map_err(|e| Error::Storage(format!("failed to encode log entry: {e}")))?;

        if is_info_log {
            // Hash overwrite plus sorted-set re-score: latest info wins.
            let _: () = conn
                .hset(&info_key, run_id.to_string(), &payload)
                .await
                .map_err(|e| storage_err("failed to write info record", e))?;
            let _: () = conn
                .zadd(&sorted_key, run_id.to_string(), now.timestamp_micros())
                .await
                .map_err(|e| storage_err("failed to index info record", e))?;
        } else {
            let _: () = conn
                .lpush(&list_key, &payload)
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
        let info_key = self.tables.run_info.clone();
        let sorted_key = self.info_sorted_key();
        let conn = self.conn.as_mut().ok_or_else(not_initialized)?;

        let mut out = Vec::new();
        let mut start: isize = 0;

        // The sorted set orders ids newest-first; page through it until the
        // limit is met or the set is exhausted. Filtering happens here, not
        // in the store, so a filtered query may scan several batches.
        while out.len() < limit {
            let ids: Vec<String> = conn
                .zrevrange(&sorted_key, start, start + RUN_INFO_BATCH - 1)
                .await
                .map_err(|e| storage_err("failed to read run-info index", e))?;
            if ids.is_empty() {
                break;
            }
            start += RUN_INFO_BATCH;

            for id in ids {
                let raw: Option<String> = conn
                    .hget(&info_key, &id)
                    .await
                    .map_err(|e| storage_err("failed to read run-info entry", e))?;
                let Some(raw) = raw else {
                    continue;
                };
                let entry = decode_entry(&raw)?;
                let log_type = entry.log_type.ok_or_else(|| {
                    Error::Storage(format!("run-info entry for {id} has no log type"))
                })?;
                if log_type_filter.is_some_and(|filter| filter != log_type) {
                    continue;
                }
                out.push(RunInfo {
                    run_id: entry.run_id,
                    log_type,
                });
                if out.len() >= limit {
                    break;
                }
            }
        }

        Ok(out)
    }

    async fn get_logs(
        &mut self,
        run_ids: &[Uuid],
        limit_per_run: usize,
    ) -> Result<Vec<EventRecord>> {
        check_run_ids(run_ids)?;
        if limit_per_run == 0 {
            return Ok(Vec::new());
        }
        let list_keys: Vec<String> = run_ids.iter().map(|id| self.run_list_key(*id)).collect();
        let conn = self.conn.as_mut().ok_or_else(not_initialized)?;

        let mut records = Vec::new();
        for list_key in &list_keys {
            // LPUSH keeps the list newest-first, so a bounded prefix read is
            // exactly the top-N-per-run the relational variants compute.
            let raw_entries: Vec<String> = conn
                .lrange(list_key, 0, limit_per_run as isize - 1)
                .await
                .map_err(|e| storage_err("failed to read event records", e))?;
            for raw in &raw_entries {
                let entry = decode_entry(raw)?;
                records.push(EventRecord {
                    run_id: entry.run_id,
                    key: entry.key,
                    value: entry.value,
                    timestamp: entry.timestamp,
                });
            }
        }
        Ok(records)
    }

    async fn log_throughput(
        &mut self,
        timestamp: DateTime<Utc>,
        num_requests: i64,
        request_type: &str,
    ) -> Result<()> {
        let throughput_key = self.tables.throughput.clone();
        let conn = self.conn.as_mut().ok_or_else(not_initialized)?;

        let sample = StoredSample {
            timestamp,
            num_requests,
            request_type: request_type.to_string(),
        };
        let payload = serde_json::to_string(&sample)
            .map_err(|e| Error::Storage(format!("failed to encode throughput sample: {e}")))?;

        let _: () = conn
            .zadd(&throughput_key, &payload, timestamp.timestamp_micros())
            .await
            .map_err(|e| storage_err("failed to write throughput sample", e))?;
        Ok(())
    }

    async fn get_throughput_data(
        &mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ThroughputSample>> {
        let throughput_key = self.tables.throughput.clone();
        let conn = self.conn.as_mut().ok_or_else(not_initialized)?;

        let raw_samples: Vec<String> = if let (Some(start), Some(end)) = (start, end) {
            conn.zrangebyscore(
                &throughput_key,
                start.timestamp_micros(),
                end.timestamp_micros(),
            )
            .await
            .map_err(|e| storage_err("failed to read throughput samples", e))?
        } else {
            conn.zrange(&throughput_key, 0, -1)
                .await
                .map_err(|e| storage_err("failed to read throughput samples", e))?
        };

        raw_samples
            .iter()
            .map(|raw| {
                let sample: StoredSample = serde_json::from_str(raw).map_err(|e| {
                    Error::Storage(format!("corrupt stored throughput sample '{raw}': {e}"))
                })?;
                Ok(ThroughputSample {
                    timestamp: sample.timestamp,
                    num_requests: sample.num_requests,
                    request_type: sample.request_type,
                })
            })
            .collect()
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the multiplexed connection releases it; nothing to flush.
        self.conn = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_entry_round_trip() {
        let entry = StoredEntry {
            timestamp: Utc::now(),
            run_id: Uuid::new_v4(),
            key: "search_query".to_string(),
            value: "what is rust".to_string(),
            log_type: None,
        };
        let payload = serde_json::to_string(&entry).unwrap();
        assert!(!payload.contains("log_type"));

        let decoded = decode_entry(&payload).unwrap();
        assert_eq!(decoded.run_id, entry.run_id);
        assert_eq!(decoded.key, "search_query");
    }

    #[test]
    fn test_key_layout() {
        let provider = RedisLogProvider::new(
            RedisConfig {
                host: "localhost".to_string(),
                port: 6379,
            },
            TableNames::default(),
        )
        .unwrap();

        let run_id = Uuid::nil();
        assert_eq!(
            provider.run_list_key(run_id),
            format!("logs:{run_id}")
        );
        assert_eq!(provider.info_sorted_key(), "run_info_sorted");
    }
}
