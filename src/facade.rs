//! Stable logging facade.
//!
//! Every operation acquires a fresh provider from the registry, delegates,
//! and releases it on all exit paths. The error policy is asymmetric:
//! write operations swallow and log provider failures (telemetry must not
//! break the pipeline it observes); read operations propagate failures to
//! the caller.

use chrono::{DateTime, Utc};
use tracing::{error, warn};
use uuid::Uuid;

use crate::analytics::{process_logs, LogAnalytics};
use crate::provider::LogProvider;
use crate::record::{EventRecord, RunInfo, ThroughputSample};
use crate::registry::ProviderRegistry;
use crate::Result;

/// Runs consulted by `get_analytics`, newest first.
const ANALYTICS_RUN_LIMIT: usize = 10;
/// Records fetched per run by `get_analytics`.
const ANALYTICS_LOGS_PER_RUN: usize = 100;

/// The stable entry-point API for run-scoped event logging.
pub struct PipelineLogger {
    registry: ProviderRegistry,
}

impl PipelineLogger {
    /// Wrap a configured registry.
    #[must_use]
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Append one event record. All failures (acquisition, validation,
    /// write) are logged and swallowed.
    pub async fn log(&self, run_id: Uuid, key: &str, value: &str, is_info_log: bool) {
        let mut provider = match self.registry.get_instance().await {
            Ok(provider) => provider,
            Err(e) => {
                error!(%run_id, key, error = %e, "failed to acquire log provider");
                return;
            }
        };
        if let Err(e) = provider.log(run_id, key, value, is_info_log).await {
            error!(%run_id, key, error = %e, "failed to write log record");
        }
        release(provider).await;
    }

    /// Append one throughput sample. Failures are logged and swallowed.
    pub async fn log_throughput(
        &self,
        timestamp: DateTime<Utc>,
        num_requests: i64,
        request_type: &str,
    ) {
        let mut provider = match self.registry.get_instance().await {
            Ok(provider) => provider,
            Err(e) => {
                error!(request_type, error = %e, "failed to acquire log provider");
                return;
            }
        };
        if let Err(e) = provider
            .log_throughput(timestamp, num_requests, request_type)
            .await
        {
            error!(request_type, error = %e, "failed to write throughput sample");
        }
        release(provider).await;
    }

    /// Return up to `limit` run-metadata entries, newest first, optionally
    /// filtered to an exact log type.
    ///
    /// # Errors
    ///
    /// Propagates provider failures unchanged.
    pub async fn get_run_info(
        &self,
        limit: usize,
        log_type_filter: Option<&str>,
    ) -> Result<Vec<RunInfo>> {
        let mut provider = self.registry.get_instance().await?;
        let result = provider.get_run_info(limit, log_type_filter).await;
        release(provider).await;
        result
    }

    /// For each run, return at most `limit_per_run` records, newest-first
    /// within the run.
    ///
    /// # Errors
    ///
    /// Propagates provider failures unchanged, including the
    /// [`Error::Validation`](crate::Error::Validation) for an empty run-id
    /// set.
    pub async fn get_logs(
        &self,
        run_ids: &[Uuid],
        limit_per_run: usize,
    ) -> Result<Vec<EventRecord>> {
        let mut provider = self.registry.get_instance().await?;
        let result = provider.get_logs(run_ids, limit_per_run).await;
        release(provider).await;
        result
    }

    /// Read the throughput series, restricted to the closed interval when
    /// both bounds are given.
    ///
    /// # Errors
    ///
    /// Propagates provider failures unchanged.
    pub async fn get_throughput_data(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<ThroughputSample>> {
        let mut provider = self.registry.get_instance().await?;
        let result = provider.get_throughput_data(start, end).await;
        release(provider).await;
        result
    }

    /// Mine the most recent runs into chart-ready aggregates.
    ///
    /// Fetches up to 10 newest runs (optionally filtered by type), up to
    /// 100 records per run, and the full throughput series, then runs the
    /// analytics pass. With no matching runs the aggregate is empty.
    ///
    /// # Errors
    ///
    /// Propagates provider failures and analytics
    /// [`Error::Parse`](crate::Error::Parse) failures unchanged.
    pub async fn get_analytics(&self, log_type_filter: Option<&str>) -> Result<LogAnalytics> {
        let run_info = self
            .get_run_info(ANALYTICS_RUN_LIMIT, log_type_filter)
            .await?;
        let run_ids: Vec<Uuid> = run_info.iter().map(|info| info.run_id).collect();
        if run_ids.is_empty() {
            return Ok(LogAnalytics::default());
        }

        let logs = self.get_logs(&run_ids, ANALYTICS_LOGS_PER_RUN).await?;
        let throughput = self.get_throughput_data(None, None).await?;

        let mut analytics = process_logs(&logs)?;
        // The stored series is authoritative; in-stream "throughput"
        // records are a legacy source and are shadowed here.
        analytics.throughput_data = throughput;
        Ok(analytics)
    }
}

/// Release a provider handle. Close failures are logged, never surfaced.
async fn release(mut provider: Box<dyn LogProvider>) {
    if let Err(e) = provider.close().await {
        warn!(error = %e, "failed to close log provider");
    }
}
