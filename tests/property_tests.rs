//! Property-based tests for pipelog
//!
//! - Analytics invariants hold for arbitrary inputs
//! - The top-N-per-run contract is bounded and newest-first for any
//!   record count and limit

use std::time::Duration;

use proptest::prelude::*;
use uuid::Uuid;

use pipelog::analytics::process_logs;
use pipelog::config::{SqliteConfig, TableNames};
use pipelog::provider::{LogProvider, SqliteLogProvider};
use pipelog::record::EventRecord;

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// Generate a 3-digit error code
fn arb_error_code() -> impl Strategy<Value = String> {
    (100u32..=999).prop_map(|code| code.to_string())
}

// ============================================================================
// Analytics Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: the extracted error code is always the last 3-digit token
    #[test]
    fn prop_error_extraction_picks_last_code(
        codes in proptest::collection::vec(arb_error_code(), 1..6)
    ) {
        let message = codes
            .iter()
            .map(|code| format!("failed with {code}"))
            .collect::<Vec<_>>()
            .join(", ");
        let record = EventRecord::new(Uuid::new_v4(), "error", message);

        let analytics = process_logs(&[record]).unwrap();
        let pie = &analytics.error_distribution.pie_chart_data;

        prop_assert_eq!(pie.len(), 1);
        prop_assert_eq!(&pie[0].error_type, codes.last().unwrap());
        prop_assert_eq!(pie[0].count, 1);
    }

    /// Property: every well-formed score survives extraction, in order
    #[test]
    fn prop_retrieval_scores_survive_extraction(
        scores in proptest::collection::vec(0.0f64..1.0, 0..8)
    ) {
        let entries: Vec<String> = scores
            .iter()
            .map(|score| format!("{{\"score\":{score}}}"))
            .collect();
        let value = serde_json::to_string(&entries).unwrap();
        let record = EventRecord::new(Uuid::new_v4(), "search_results", value);

        let analytics = process_logs(&[record]).unwrap();
        prop_assert_eq!(analytics.retrieval_scores, scores);
    }

    /// Property: pie totals equal the sum of the per-day histogram
    #[test]
    fn prop_pie_totals_match_histogram(
        codes in proptest::collection::vec(arb_error_code(), 0..12)
    ) {
        let records: Vec<EventRecord> = codes
            .iter()
            .map(|code| EventRecord::new(Uuid::new_v4(), "error", format!("failed with {code}")))
            .collect();

        let analytics = process_logs(&records).unwrap();

        let pie_total: u64 = analytics
            .error_distribution
            .pie_chart_data
            .iter()
            .map(|slice| slice.count)
            .sum();
        let histogram_total: u64 = analytics
            .error_rates
            .stacked_bar_chart_data
            .datasets
            .iter()
            .flat_map(|series| series.data.iter())
            .sum();

        prop_assert_eq!(pie_total, codes.len() as u64);
        prop_assert_eq!(histogram_total, codes.len() as u64);
    }
}

// ============================================================================
// Storage Contract Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: get_logs returns min(limit, count) records, newest-first,
    /// and they are exactly the most recent writes
    #[test]
    fn prop_top_n_per_run_is_bounded_and_newest_first(
        num_records in 1usize..8,
        limit in 1usize..10,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let mut provider = SqliteLogProvider::new(
                SqliteConfig {
                    path: "sqlite::memory:".to_string(),
                },
                TableNames::default(),
            )
            .unwrap();
            provider.init().await.unwrap();

            let run_id = Uuid::new_v4();
            for i in 0..num_records {
                provider
                    .log(run_id, "step", &i.to_string(), false)
                    .await
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;
            }

            let records = provider.get_logs(&[run_id], limit).await.unwrap();
            assert_eq!(records.len(), limit.min(num_records));

            for pair in records.windows(2) {
                assert!(pair[0].timestamp >= pair[1].timestamp);
            }

            let expected: Vec<String> = (num_records - records.len()..num_records)
                .rev()
                .map(|i| i.to_string())
                .collect();
            let got: Vec<String> = records.iter().map(|r| r.value.clone()).collect();
            assert_eq!(got, expected);

            provider.close().await.unwrap();
        });
    }
}
