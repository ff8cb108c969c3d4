//! Shared data model for run-scoped event logging.
//!
//! These shapes cross every storage boundary unchanged: run identifiers are
//! UUIDs serialized as canonical text, timestamps are UTC instants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One key/value telemetry fact tied to a run.
///
/// Records are append-only. Info records (the run's type tag) are
/// distinguished at write time by a flag, not by schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Run the record belongs to.
    pub run_id: Uuid,
    /// Telemetry key.
    pub key: String,
    /// Telemetry value.
    pub value: String,
    /// Write timestamp.
    pub timestamp: DateTime<Utc>,
}

impl EventRecord {
    /// Create a record stamped with the current time.
    #[must_use]
    pub fn new(run_id: Uuid, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            run_id,
            key: key.into(),
            value: value.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Metadata for one pipeline run, derived from its most recent info record.
///
/// Created implicitly on the first info-record write; a later info write for
/// the same run is a logical upsert. Never deleted by this subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    /// Run identifier.
    pub run_id: Uuid,
    /// The run's type tag, taken from its most recent info record.
    pub log_type: String,
}

/// One sample of the request-throughput series.
///
/// An independent append-only series, not associated with any run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughputSample {
    /// Sample timestamp.
    pub timestamp: DateTime<Utc>,
    /// Number of requests observed in the sampling window.
    pub num_requests: i64,
    /// Kind of request the sample counts (e.g. "search", "rag").
    pub request_type: String,
}
