//! Slow-query log analysis models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Query text used when a log line carries a duration but no statement.
pub const NO_STATEMENT_TEXT: &str = "(no statement text)";

/// One logged statement that ran for at least a second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowQueryRecord {
    /// Event timestamp in milliseconds since the epoch (0 when unknown).
    pub timestamp: i64,
    /// Execution time in milliseconds.
    pub duration_ms: f64,
    pub query: String,
    /// `duration_ms / 1000`, for display.
    pub duration_seconds: f64,
    /// `YYYY-MM-DD HH:MM:SS` (UTC) rendering of `timestamp`, empty when unknown.
    pub datetime: String,
}

impl SlowQueryRecord {
    pub fn new(timestamp: i64, duration_ms: f64, query: impl Into<String>) -> Self {
        let datetime = if timestamp != 0 {
            DateTime::<Utc>::from_timestamp_millis(timestamp)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default()
        } else {
            String::new()
        };
        Self {
            timestamp,
            duration_ms,
            query: query.into(),
            duration_seconds: duration_ms / 1000.0,
            datetime,
        }
    }
}

/// Record counts per duration range. Ranges include their lower bound and
/// exclude their upper bound; `5m+` is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationBuckets {
    #[serde(rename = "1-5s")]
    pub one_to_five_secs: u64,
    #[serde(rename = "5-10s")]
    pub five_to_ten_secs: u64,
    #[serde(rename = "10-30s")]
    pub ten_to_thirty_secs: u64,
    #[serde(rename = "30s-1m")]
    pub thirty_secs_to_one_min: u64,
    #[serde(rename = "1-5m")]
    pub one_to_five_mins: u64,
    #[serde(rename = "5m+")]
    pub five_mins_plus: u64,
}

impl DurationBuckets {
    /// Counts `duration_ms` in its bucket. Durations under a second are ignored.
    pub fn record(&mut self, duration_ms: f64) {
        let slot = match duration_ms {
            d if d < 1_000.0 || d.is_nan() => return,
            d if d < 5_000.0 => &mut self.one_to_five_secs,
            d if d < 10_000.0 => &mut self.five_to_ten_secs,
            d if d < 30_000.0 => &mut self.ten_to_thirty_secs,
            d if d < 60_000.0 => &mut self.thirty_secs_to_one_min,
            d if d < 300_000.0 => &mut self.one_to_five_mins,
            _ => &mut self.five_mins_plus,
        };
        *slot += 1;
    }

    pub fn total(&self) -> u64 {
        self.one_to_five_secs
            + self.five_to_ten_secs
            + self.ten_to_thirty_secs
            + self.thirty_secs_to_one_min
            + self.one_to_five_mins
            + self.five_mins_plus
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Aggregate statistics over a set of slow-query records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlowQueryReport {
    pub total_count: usize,
    pub avg_duration_ms: f64,
    pub max_duration_ms: f64,
    pub min_duration_ms: f64,
    pub total_duration_ms: f64,
    pub duration_buckets: DurationBuckets,
    /// The ten slowest records, slowest first.
    pub top_records: Vec<SlowQueryRecord>,
}

/// Result of analyzing the remote logs of one database identifier.
#[derive(Debug, Clone, Serialize)]
pub struct SlowQueryAnalysis {
    pub identifier: String,
    pub hours_back: u32,
    pub log_groups_count: usize,
    pub records: Vec<SlowQueryRecord>,
    pub report: SlowQueryReport,
}

/// Result of analyzing a downloaded log file.
#[derive(Debug, Clone, Serialize)]
pub struct LogFileAnalysis {
    /// Length of the raw content in bytes.
    pub log_length: usize,
    pub records: Vec<SlowQueryRecord>,
    pub report: SlowQueryReport,
}

/// Cheap overview over a bounded slice of the remote logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SlowQuerySummary {
    pub identifier: String,
    pub hours_back: u32,
    pub total_events: usize,
    pub total_slow_queries: usize,
    pub log_groups_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_derived_fields() {
        let record = SlowQueryRecord::new(1_700_000_000_000, 6100.5, "SELECT pg_sleep(6);");
        assert_eq!(record.duration_seconds, 6.1005);
        assert_eq!(record.datetime, "2023-11-14 22:13:20");

        let undated = SlowQueryRecord::new(0, 1500.0, NO_STATEMENT_TEXT);
        assert!(undated.datetime.is_empty());
    }

    #[test]
    fn test_bucket_boundaries() {
        let mut buckets = DurationBuckets::default();
        for d in [999.9, 1000.0, 4999.9, 5000.0, 30_000.0, 59_999.0, 60_000.0, 300_000.0] {
            buckets.record(d);
        }
        assert_eq!(buckets.one_to_five_secs, 2);
        assert_eq!(buckets.five_to_ten_secs, 1);
        assert_eq!(buckets.ten_to_thirty_secs, 0);
        assert_eq!(buckets.thirty_secs_to_one_min, 2);
        assert_eq!(buckets.one_to_five_mins, 1);
        assert_eq!(buckets.five_mins_plus, 1);
        assert_eq!(buckets.total(), 7);
    }
}
