//! On-demand slow-query analysis over the remote log service or a
//! downloaded log file.

use std::sync::Arc;

use chrono::Utc;
use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::slow_query::{
    LogFileAnalysis, SlowQueryAnalysis, SlowQueryRecord, SlowQueryReport, SlowQuerySummary,
};

use crate::parser::SlowQueryParser;
use crate::report::aggregate;
use crate::source::{LogEvent, LogSource};

/// Log groups scanned by [`SlowQueryLogAnalyzer::summarize_for_identifier`].
const SUMMARY_MAX_GROUPS: usize = 3;
/// Streams per group scanned by [`SlowQueryLogAnalyzer::summarize_for_identifier`].
const SUMMARY_MAX_STREAMS: usize = 5;
/// Look-back window used when the caller does not pick one.
pub const DEFAULT_HOURS_BACK: u32 = 24;

/// Fetches log events through a [`LogSource`] and turns them into slow-query
/// records and statistics.
pub struct SlowQueryLogAnalyzer {
    source: Arc<dyn LogSource>,
    parser: SlowQueryParser,
    default_hours_back: u32,
}

impl SlowQueryLogAnalyzer {
    pub fn new(source: Arc<dyn LogSource>) -> Self {
        Self {
            source,
            parser: SlowQueryParser::new(),
            default_hours_back: DEFAULT_HOURS_BACK,
        }
    }

    /// Uses the configured look-back window for [`Self::analyze_recent`].
    pub fn from_config(source: Arc<dyn LogSource>, config: &AppConfig) -> Self {
        Self {
            default_hours_back: config.slow_query_hours.max(1),
            ..Self::new(source)
        }
    }

    /// [`Self::analyze_for_identifier`] over the default look-back window.
    pub async fn analyze_recent(&self, identifier: &str) -> AppResult<SlowQueryAnalysis> {
        self.analyze_for_identifier(identifier, self.default_hours_back).await
    }

    /// Parses raw events into slow-query records, slowest first.
    pub fn parse_log_events(&self, events: &[LogEvent]) -> Vec<SlowQueryRecord> {
        self.parser.parse_log_events(events)
    }

    /// Summarizes a set of records.
    pub fn aggregate(&self, records: &[SlowQueryRecord]) -> SlowQueryReport {
        aggregate(records)
    }

    /// Analyzes every stream of every log group of `identifier` over the last
    /// `hours_back` hours.
    ///
    /// # Errors
    /// Returns `AppError::LogGroupsNotFound` when the identifier has no log
    /// groups. Failures on individual streams are logged and skipped.
    pub async fn analyze_for_identifier(
        &self,
        identifier: &str,
        hours_back: u32,
    ) -> AppResult<SlowQueryAnalysis> {
        let log_groups = self.resolve_log_groups(identifier).await?;
        let (start_ms, end_ms) = time_window(hours_back);

        let mut records = Vec::new();
        for group in &log_groups {
            for stream in self.streams_of(group, hours_back).await {
                let events = self.events_of(group, &stream, start_ms, end_ms).await;
                records.extend(self.parser.parse_log_events(&events));
            }
        }

        // Each stream is sorted on its own; restore the global order.
        records.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
        let report = aggregate(&records);

        tracing::info!(
            identifier,
            hours_back,
            log_groups = log_groups.len(),
            slow_queries = records.len(),
            "Slow query analysis finished"
        );

        Ok(SlowQueryAnalysis {
            identifier: identifier.to_string(),
            hours_back,
            log_groups_count: log_groups.len(),
            records,
            report,
        })
    }

    /// Counts events and slow queries over the most recent few groups and
    /// streams only, for a quick overview.
    pub async fn summarize_for_identifier(
        &self,
        identifier: &str,
        hours_back: u32,
    ) -> AppResult<SlowQuerySummary> {
        let log_groups = self.resolve_log_groups(identifier).await?;
        let (start_ms, end_ms) = time_window(hours_back);

        let mut summary = SlowQuerySummary {
            identifier: identifier.to_string(),
            hours_back,
            log_groups_count: log_groups.len(),
            ..Default::default()
        };
        for group in log_groups.iter().take(SUMMARY_MAX_GROUPS) {
            let streams = self.streams_of(group, hours_back).await;
            for stream in streams.iter().take(SUMMARY_MAX_STREAMS) {
                let events = self.events_of(group, stream, start_ms, end_ms).await;
                summary.total_events += events.len();
                summary.total_slow_queries += self.parser.parse_log_events(&events).len();
            }
        }
        Ok(summary)
    }

    /// Analyzes the text of a downloaded log file. Lines carry no timestamps,
    /// so the resulting records have an empty `datetime`.
    pub fn analyze_log_file_content(&self, content: &str) -> LogFileAnalysis {
        let events: Vec<LogEvent> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| LogEvent::new(line, 0))
            .collect();
        let records = self.parser.parse_log_events(&events);
        let report = aggregate(&records);
        LogFileAnalysis {
            log_length: content.len(),
            records,
            report,
        }
    }

    async fn resolve_log_groups(&self, identifier: &str) -> AppResult<Vec<String>> {
        let groups = match self.source.list_log_groups(identifier).await {
            Ok(groups) => groups,
            Err(e) => {
                tracing::warn!(identifier, error = %e, "Failed to list log groups");
                Vec::new()
            }
        };
        if groups.is_empty() {
            return Err(AppError::LogGroupsNotFound(identifier.to_string()));
        }
        Ok(groups)
    }

    async fn streams_of(&self, group: &str, hours_back: u32) -> Vec<String> {
        self.source
            .list_log_streams(group, hours_back)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(log_group = group, error = %e, "Failed to list log streams");
                Vec::new()
            })
    }

    async fn events_of(&self, group: &str, stream: &str, start_ms: i64, end_ms: i64) -> Vec<LogEvent> {
        self.source
            .get_log_events(group, stream, start_ms, end_ms)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(log_group = group, log_stream = stream, error = %e, "Failed to read log events");
                Vec::new()
            })
    }
}

fn time_window(hours_back: u32) -> (i64, i64) {
    let end_ms = Utc::now().timestamp_millis();
    let start_ms = end_ms - i64::from(hours_back) * 3_600_000;
    (start_ms, end_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticLogSource;
    use async_trait::async_trait;
    use common::models::slow_query::NO_STATEMENT_TEXT;

    const INSTANCE_GROUP: &str = "/aws/rds/instance/orders/postgresql";
    const CLUSTER_GROUP: &str = "/aws/rds/cluster/orders/postgresql";

    fn recent(offset_ms: i64) -> i64 {
        Utc::now().timestamp_millis() - 60_000 + offset_ms
    }

    fn analyzer(source: StaticLogSource) -> SlowQueryLogAnalyzer {
        SlowQueryLogAnalyzer::new(Arc::new(source))
    }

    #[tokio::test]
    async fn test_fan_out_across_groups_and_streams() {
        let source = StaticLogSource::new()
            .with_events(
                INSTANCE_GROUP,
                "stream-a",
                vec![
                    LogEvent::new("duration: 1500 ms statement: SELECT 1", recent(0)),
                    LogEvent::new("duration: 20 ms statement: SELECT 2", recent(1)),
                ],
            )
            .with_events(
                INSTANCE_GROUP,
                "stream-b",
                vec![LogEvent::new("duration: 7000 ms statement: SELECT 3", recent(2))],
            )
            .with_events(
                CLUSTER_GROUP,
                "stream-c",
                vec![LogEvent::new("duration: 3000 ms", recent(3))],
            );

        let analysis = analyzer(source).analyze_for_identifier("orders", 1).await.unwrap();
        assert_eq!(analysis.log_groups_count, 2);
        assert_eq!(analysis.report.total_count, 3);
        let durations: Vec<f64> = analysis.records.iter().map(|r| r.duration_ms).collect();
        assert_eq!(durations, vec![7000.0, 3000.0, 1500.0]);
        assert_eq!(analysis.records[1].query, NO_STATEMENT_TEXT);
        assert!(!analysis.records[0].datetime.is_empty());
    }

    #[tokio::test]
    async fn test_analyze_recent_uses_configured_window() {
        let five_hours_ago = Utc::now().timestamp_millis() - 5 * 3_600_000;
        let source = Arc::new(StaticLogSource::new().with_events(
            INSTANCE_GROUP,
            "s",
            vec![LogEvent::new("duration: 2500 ms statement: SELECT 1", five_hours_ago)],
        ));

        let config = AppConfig {
            slow_query_hours: 2,
            ..AppConfig::default()
        };
        let narrow = SlowQueryLogAnalyzer::from_config(source.clone(), &config);
        assert!(narrow.analyze_recent("orders").await.unwrap().records.is_empty());

        let default = SlowQueryLogAnalyzer::new(source);
        let analysis = default.analyze_recent("orders").await.unwrap();
        assert_eq!(analysis.hours_back, DEFAULT_HOURS_BACK);
        assert_eq!(analysis.records.len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_stream_is_skipped() {
        let source = StaticLogSource::new()
            .with_unreadable_stream(INSTANCE_GROUP, "broken")
            .with_events(
                INSTANCE_GROUP,
                "healthy",
                vec![LogEvent::new("duration: 2500 ms statement: SELECT 1", recent(0))],
            );

        let analysis = analyzer(source).analyze_for_identifier("orders", 1).await.unwrap();
        assert_eq!(analysis.records.len(), 1);
    }

    #[tokio::test]
    async fn test_events_outside_window_are_ignored() {
        let two_hours_ago = Utc::now().timestamp_millis() - 2 * 3_600_000;
        let source = StaticLogSource::new().with_events(
            INSTANCE_GROUP,
            "s",
            vec![LogEvent::new("duration: 2500 ms statement: SELECT 1", two_hours_ago)],
        );

        let analysis = analyzer(source).analyze_for_identifier("orders", 1).await.unwrap();
        assert!(analysis.records.is_empty());
        assert_eq!(analysis.report.total_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_identifier_is_not_found() {
        let source = StaticLogSource::new().with_events(INSTANCE_GROUP, "s", vec![]);
        let err = analyzer(source).analyze_for_identifier("billing", 24).await.unwrap_err();
        assert!(matches!(err, AppError::LogGroupsNotFound(id) if id == "billing"));
    }

    struct UnreachableLogs;

    #[async_trait]
    impl LogSource for UnreachableLogs {
        async fn list_log_groups(&self, _identifier: &str) -> AppResult<Vec<String>> {
            Err(AppError::LogSource("connection refused".into()))
        }

        async fn list_log_streams(&self, _group: &str, _hours: u32) -> AppResult<Vec<String>> {
            unreachable!("no groups to list streams for")
        }

        async fn get_log_events(&self, _g: &str, _s: &str, _from: i64, _to: i64) -> AppResult<Vec<LogEvent>> {
            unreachable!("no streams to read")
        }
    }

    #[tokio::test]
    async fn test_log_service_outage_surfaces_as_not_found() {
        let analyzer = SlowQueryLogAnalyzer::new(Arc::new(UnreachableLogs));
        let err = analyzer.analyze_for_identifier("orders", 24).await.unwrap_err();
        assert!(matches!(err, AppError::LogGroupsNotFound(_)));
    }

    #[tokio::test]
    async fn test_summary_limits_streams() {
        let mut source = StaticLogSource::new();
        for i in 0..7 {
            source = source.with_events(
                INSTANCE_GROUP,
                format!("stream-{i}"),
                vec![
                    LogEvent::new("duration: 1500 ms statement: SELECT 1", recent(i)),
                    LogEvent::new("checkpoint complete", recent(i)),
                ],
            );
        }

        let summary = analyzer(source).summarize_for_identifier("orders", 1).await.unwrap();
        assert_eq!(summary.log_groups_count, 1);
        assert_eq!(summary.total_events, 10);
        assert_eq!(summary.total_slow_queries, 5);
    }

    #[test]
    fn test_log_file_content() {
        let content = "2024-03-01 12:00:00 UTC::@:[1]:LOG:  duration: 4200.5 ms  statement: SELECT count(*) FROM orders\n\n   \n2024-03-01 12:00:05 UTC::@:[1]:LOG:  duration: 12 ms  statement: SELECT 1\n2024-03-01 12:00:09 UTC::@:[1]:LOG:  duration: 65000 ms\n";
        let analysis = analyzer(StaticLogSource::new()).analyze_log_file_content(content);

        assert_eq!(analysis.log_length, content.len());
        assert_eq!(analysis.records.len(), 2);
        assert_eq!(analysis.records[0].duration_ms, 65000.0);
        assert_eq!(analysis.records[0].query, NO_STATEMENT_TEXT);
        assert_eq!(analysis.records[1].query, "SELECT count(*) FROM orders");
        assert!(analysis.records.iter().all(|r| r.datetime.is_empty()));
        assert_eq!(analysis.report.duration_buckets.one_to_five_secs, 1);
        assert_eq!(analysis.report.duration_buckets.one_to_five_mins, 1);
    }
}
