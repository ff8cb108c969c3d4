//! Log-mining engine.
//!
//! A single synchronous pass over raw event records, demultiplexed by key
//! into typed, chart-ready aggregates: an error histogram per day, an error
//! distribution, retrieval-score and latency samples, and query
//! timestamps. Aggregates are ephemeral: recomputed from scratch on every
//! request, never persisted.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::record::{EventRecord, ThroughputSample};
use crate::{Error, Result};

/// The most specific error code in a message is the last 3-digit token.
static ERROR_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{3}\b").unwrap());

/// Per-day error histogram, shaped for a stacked bar chart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRates {
    /// Labels plus one dataset per error code, zero-filled per day.
    #[serde(rename = "stackedBarChartData")]
    pub stacked_bar_chart_data: StackedBarData,
}

/// Labels and datasets of the stacked bar chart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackedBarData {
    /// One label per day seen, ascending.
    pub labels: Vec<String>,
    /// One series per error code.
    pub datasets: Vec<ErrorSeries>,
}

/// Counts of one error code across the labeled days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSeries {
    /// Display label, e.g. `Error Code 503`.
    pub label: String,
    /// One count per day label, zero-filled for days without this code.
    pub data: Vec<u64>,
}

/// Total error distribution, shaped for a pie chart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDistribution {
    /// One slice per error code seen.
    #[serde(rename = "pieChartData")]
    pub pie_chart_data: Vec<PieSlice>,
}

/// One pie-chart slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieSlice {
    /// Error code.
    pub error_type: String,
    /// Total occurrences across all days.
    pub count: u64,
}

/// Everything the analytics pass mines out of a bag of event records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogAnalytics {
    /// Per-day error histogram.
    pub error_rates: ErrorRates,
    /// Total error distribution.
    pub error_distribution: ErrorDistribution,
    /// Scores of every retrieved search result.
    pub retrieval_scores: Vec<f64>,
    /// Timestamps of every search query.
    pub query_timestamps: Vec<DateTime<Utc>>,
    /// Vector-search latencies, seconds.
    pub vector_search_latencies: Vec<f64>,
    /// Generation latencies, seconds.
    pub rag_generation_latencies: Vec<f64>,
    /// Throughput series. Populated by the facade from the stored sample
    /// series; in-stream `"throughput"` records are a legacy source that
    /// the facade shadows.
    pub throughput_data: Vec<ThroughputSample>,
}

/// Mine a bag of event records into aggregates.
///
/// One pass, demultiplexed by key. Records with unrecognized keys are
/// ignored. Malformed `search_results` entries are logged and skipped;
/// malformed latency and throughput values abort the pass.
///
/// # Errors
///
/// Returns [`Error::Parse`] for an unparseable latency float or
/// `"throughput"` payload.
pub fn process_logs(records: &[EventRecord]) -> Result<LogAnalytics> {
    let mut error_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut error_days: BTreeMap<NaiveDate, BTreeMap<String, u64>> = BTreeMap::new();
    let mut retrieval_scores = Vec::new();
    let mut query_timestamps = Vec::new();
    let mut vector_search_latencies = Vec::new();
    let mut rag_generation_latencies = Vec::new();
    let mut throughput_data = Vec::new();

    for record in records {
        match record.key.as_str() {
            "error" => {
                let Some(code) = last_error_code(&record.value) else {
                    continue;
                };
                *error_counts.entry(code.clone()).or_default() += 1;
                *error_days
                    .entry(record.timestamp.date_naive())
                    .or_default()
                    .entry(code)
                    .or_default() += 1;
            }
            "search_results" => collect_scores(record, &mut retrieval_scores),
            "search_query" => query_timestamps.push(record.timestamp),
            "vector_search_latency" => vector_search_latencies.push(parse_latency(record)?),
            "rag_generation_latency" => rag_generation_latencies.push(parse_latency(record)?),
            "throughput" => throughput_data.push(parse_throughput(record)?),
            _ => {}
        }
    }

    let labels: Vec<String> = error_days
        .keys()
        .map(|day| day.format("%Y-%m-%d").to_string())
        .collect();
    let datasets: Vec<ErrorSeries> = error_counts
        .keys()
        .map(|code| ErrorSeries {
            label: format!("Error Code {code}"),
            data: error_days
                .values()
                .map(|day| day.get(code).copied().unwrap_or(0))
                .collect(),
        })
        .collect();
    let pie_chart_data: Vec<PieSlice> = error_counts
        .iter()
        .map(|(code, count)| PieSlice {
            error_type: code.clone(),
            count: *count,
        })
        .collect();

    Ok(LogAnalytics {
        error_rates: ErrorRates {
            stacked_bar_chart_data: StackedBarData { labels, datasets },
        },
        error_distribution: ErrorDistribution { pie_chart_data },
        retrieval_scores,
        query_timestamps,
        vector_search_latencies,
        rag_generation_latencies,
        throughput_data,
    })
}

fn last_error_code(message: &str) -> Option<String> {
    ERROR_CODE_RE
        .find_iter(message)
        .last()
        .map(|m| m.as_str().to_string())
}

/// Extract `score` from each JSON-encoded result. The value is a JSON array
/// of strings, each itself a JSON object. Malformed entries never abort the
/// pass: well-formed siblings are still collected.
fn collect_scores(record: &EventRecord, scores: &mut Vec<f64>) {
    let entries: Vec<String> = match serde_json::from_str(&record.value) {
        Ok(entries) => entries,
        Err(e) => {
            error!(run_id = %record.run_id, error = %e, "failed to parse search results");
            return;
        }
    };
    for entry in &entries {
        match serde_json::from_str::<serde_json::Value>(entry) {
            Ok(result) => match result.get("score").and_then(serde_json::Value::as_f64) {
                Some(score) => scores.push(score),
                None => {
                    error!(run_id = %record.run_id, %entry, "search result has no numeric score");
                }
            },
            Err(e) => {
                error!(run_id = %record.run_id, %entry, error = %e, "failed to parse search result");
            }
        }
    }
}

fn parse_latency(record: &EventRecord) -> Result<f64> {
    record.value.trim().parse().map_err(|e| {
        Error::Parse(format!(
            "invalid latency value '{}' for key '{}': {e}",
            record.value, record.key
        ))
    })
}

fn parse_throughput(record: &EventRecord) -> Result<ThroughputSample> {
    #[derive(Deserialize)]
    struct Payload {
        num_requests: i64,
        request_type: String,
    }
    let payload: Payload = serde_json::from_str(&record.value)
        .map_err(|e| Error::Parse(format!("invalid throughput payload '{}': {e}", record.value)))?;
    Ok(ThroughputSample {
        timestamp: record.timestamp,
        num_requests: payload.num_requests,
        request_type: payload.request_type,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;

    fn record_at(timestamp: DateTime<Utc>, key: &str, value: &str) -> EventRecord {
        EventRecord {
            run_id: Uuid::new_v4(),
            key: key.to_string(),
            value: value.to_string(),
            timestamp,
        }
    }

    fn record(key: &str, value: &str) -> EventRecord {
        record_at(Utc::now(), key, value)
    }

    #[test]
    fn test_error_histogram_per_day_and_pie_totals() {
        let day1 = Utc.with_ymd_and_hms(2026, 8, 4, 10, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 8, 5, 10, 0, 0).unwrap();
        let records = vec![
            record_at(day1, "error", "Request failed with code 503"),
            record_at(day1, "error", "Request failed with code 503"),
            record_at(day1, "error", "Request failed with code 503"),
            record_at(day2, "error", "Request failed with code 503"),
        ];

        let analytics = process_logs(&records).unwrap();

        let bars = &analytics.error_rates.stacked_bar_chart_data;
        assert_eq!(bars.labels, vec!["2026-08-04", "2026-08-05"]);
        assert_eq!(bars.datasets.len(), 1);
        assert_eq!(bars.datasets[0].label, "Error Code 503");
        assert_eq!(bars.datasets[0].data, vec![3, 1]);

        let pie = &analytics.error_distribution.pie_chart_data;
        assert_eq!(pie.len(), 1);
        assert_eq!(pie[0].error_type, "503");
        assert_eq!(pie[0].count, 4);
    }

    #[test]
    fn test_error_histogram_zero_fills_missing_days() {
        let day1 = Utc.with_ymd_and_hms(2026, 8, 4, 10, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 8, 5, 10, 0, 0).unwrap();
        let records = vec![
            record_at(day1, "error", "upstream returned 500"),
            record_at(day2, "error", "document not found: 404"),
        ];

        let analytics = process_logs(&records).unwrap();

        let bars = &analytics.error_rates.stacked_bar_chart_data;
        assert_eq!(bars.datasets.len(), 2);
        // Codes are ordered; each series is zero-filled across both days.
        assert_eq!(bars.datasets[0].label, "Error Code 404");
        assert_eq!(bars.datasets[0].data, vec![0, 1]);
        assert_eq!(bars.datasets[1].label, "Error Code 500");
        assert_eq!(bars.datasets[1].data, vec![1, 0]);
    }

    #[test]
    fn test_error_code_is_last_three_digit_token() {
        let records = vec![record("error", "retried after 404, finally failed with 503")];
        let analytics = process_logs(&records).unwrap();
        assert_eq!(
            analytics.error_distribution.pie_chart_data[0].error_type,
            "503"
        );
    }

    #[test]
    fn test_error_without_code_is_skipped() {
        let records = vec![
            record("error", "connection reset by peer"),
            record("error", "timeout after 5033ms"),
        ];
        let analytics = process_logs(&records).unwrap();
        assert!(analytics.error_distribution.pie_chart_data.is_empty());
        assert!(analytics
            .error_rates
            .stacked_bar_chart_data
            .labels
            .is_empty());
    }

    #[test]
    fn test_retrieval_scores_extracted() {
        let value = r#"["{\"score\":0.9}","{\"score\":0.4}"]"#;
        let analytics = process_logs(&[record("search_results", value)]).unwrap();
        assert_eq!(analytics.retrieval_scores, vec![0.9, 0.4]);
    }

    #[test]
    fn test_malformed_search_result_entry_is_skipped() {
        let value = r#"["{\"score\":0.9}","not json","{\"score\":0.4}"]"#;
        let analytics = process_logs(&[record("search_results", value)]).unwrap();
        assert_eq!(analytics.retrieval_scores, vec![0.9, 0.4]);
    }

    #[test]
    fn test_unparseable_search_results_value_is_skipped() {
        let analytics = process_logs(&[
            record("search_results", "not a json array"),
            record("search_results", r#"["{\"score\":0.7}"]"#),
        ])
        .unwrap();
        assert_eq!(analytics.retrieval_scores, vec![0.7]);
    }

    #[test]
    fn test_query_timestamps_collected() {
        let t1 = Utc.with_ymd_and_hms(2026, 8, 5, 9, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 8, 5, 9, 1, 0).unwrap();
        let records = vec![
            record_at(t1, "search_query", "what is rust"),
            record_at(t2, "search_query", "what is a borrow checker"),
        ];
        let analytics = process_logs(&records).unwrap();
        assert_eq!(analytics.query_timestamps, vec![t1, t2]);
    }

    #[test]
    fn test_latencies_parsed_per_kind() {
        let records = vec![
            record("vector_search_latency", "0.25"),
            record("rag_generation_latency", "1.75"),
            record("vector_search_latency", "0.5"),
        ];
        let analytics = process_logs(&records).unwrap();
        assert_eq!(analytics.vector_search_latencies, vec![0.25, 0.5]);
        assert_eq!(analytics.rag_generation_latencies, vec![1.75]);
    }

    #[test]
    fn test_invalid_latency_aborts_the_pass() {
        let records = vec![record("vector_search_latency", "fast")];
        let err = process_logs(&records).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_in_stream_throughput_records_parsed() {
        let value = r#"{"num_requests":12,"request_type":"search"}"#;
        let analytics = process_logs(&[record("throughput", value)]).unwrap();
        assert_eq!(analytics.throughput_data.len(), 1);
        assert_eq!(analytics.throughput_data[0].num_requests, 12);
        assert_eq!(analytics.throughput_data[0].request_type, "search");
    }

    #[test]
    fn test_invalid_throughput_payload_aborts_the_pass() {
        let err = process_logs(&[record("throughput", "12 searches")]).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_unrecognized_keys_ignored() {
        let records = vec![
            record("pipeline_stage", "retrieval"),
            record("cache_hit", "true"),
        ];
        let analytics = process_logs(&records).unwrap();
        assert_eq!(analytics, LogAnalytics::default());
    }

    #[test]
    fn test_empty_input_yields_empty_aggregate() {
        assert_eq!(process_logs(&[]).unwrap(), LogAnalytics::default());
    }
}
