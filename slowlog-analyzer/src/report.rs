//! Aggregate statistics over slow-query records.

use common::models::slow_query::{DurationBuckets, SlowQueryRecord, SlowQueryReport};

/// Number of records kept in [`SlowQueryReport::top_records`].
pub const TOP_RECORDS: usize = 10;

/// Summarizes `records`. An empty input yields an all-zero report.
pub fn aggregate(records: &[SlowQueryRecord]) -> SlowQueryReport {
    if records.is_empty() {
        return SlowQueryReport::default();
    }

    let mut buckets = DurationBuckets::default();
    let mut total = 0.0;
    let mut max = f64::MIN;
    let mut min = f64::MAX;
    for record in records {
        let d = record.duration_ms;
        total += d;
        max = max.max(d);
        min = min.min(d);
        buckets.record(d);
    }

    let mut top = records.to_vec();
    top.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
    top.truncate(TOP_RECORDS);

    SlowQueryReport {
        total_count: records.len(),
        avg_duration_ms: total / records.len() as f64,
        max_duration_ms: max,
        min_duration_ms: min,
        total_duration_ms: total,
        duration_buckets: buckets,
        top_records: top,
    }
}
