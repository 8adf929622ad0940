//! Bounded per-database sample history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use common::models::monitor::MetricSample;

/// Samples retained per database.
pub const HISTORY_CAPACITY: usize = 1000;

/// FIFO buffer of samples, oldest first. Pushing past the capacity evicts the
/// oldest entry.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    samples: VecDeque<MetricSample>,
    capacity: usize,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl HistoryBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn push(&mut self, sample: MetricSample) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn latest(&self) -> Option<&MetricSample> {
        self.samples.back()
    }

    /// Samples taken at or after `cutoff`, oldest first.
    pub fn since(&self, cutoff: DateTime<Utc>) -> Vec<MetricSample> {
        self.samples
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Snapshot of a database's history returned to callers.
///
/// Owning the samples keeps readers independent from the collector's lock;
/// the snapshot can be iterated any number of times.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricHistory {
    samples: Vec<MetricSample>,
}

impl MetricHistory {
    pub fn new(samples: Vec<MetricSample>) -> Self {
        Self { samples }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetricSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl<'a> IntoIterator for &'a MetricHistory {
    type Item = &'a MetricSample;
    type IntoIter = std::slice::Iter<'a, MetricSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_at(minutes_ago: i64) -> MetricSample {
        MetricSample::at("orders", Utc::now() - Duration::minutes(minutes_ago))
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut buffer = HistoryBuffer::with_capacity(3);
        for i in 0..5 {
            let mut s = sample_at(0);
            s.active_connections = Some(i);
            buffer.push(s);
        }
        assert_eq!(buffer.len(), 3);
        let kept: Vec<_> = buffer
            .since(Utc::now() - Duration::hours(1))
            .iter()
            .map(|s| s.active_connections)
            .collect();
        assert_eq!(kept, vec![Some(2), Some(3), Some(4)]);
        assert_eq!(buffer.latest().and_then(|s| s.active_connections), Some(4));
    }

    #[test]
    fn test_since_filters_by_timestamp() {
        let mut buffer = HistoryBuffer::default();
        buffer.push(sample_at(180));
        buffer.push(sample_at(90));
        buffer.push(sample_at(10));

        assert_eq!(buffer.since(Utc::now() - Duration::hours(1)).len(), 1);
        assert_eq!(buffer.since(Utc::now() - Duration::hours(2)).len(), 2);
        assert_eq!(buffer.since(Utc::now() - Duration::hours(24)).len(), 3);
    }

    #[test]
    fn test_snapshot_is_restartable() {
        let history = MetricHistory::new(vec![sample_at(2), sample_at(1)]);
        assert_eq!(history.iter().count(), 2);
        assert_eq!((&history).into_iter().count(), 2);
        assert_eq!(history.len(), 2);
    }
}
