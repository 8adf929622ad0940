//! PostgreSQL slow-query log parser.
//!
//! A log line may or may not carry the statement text after its duration,
//! so several patterns are tried from most to least specific. The first
//! pattern that yields at least one usable match decides the records for
//! that line; later patterns are not consulted.

use common::models::slow_query::{SlowQueryRecord, NO_STATEMENT_TEXT};
use regex::Regex;

use crate::source::LogEvent;

/// Statements faster than this are not slow queries.
pub const SLOW_QUERY_THRESHOLD_MS: f64 = 1000.0;

struct LogPattern {
    name: &'static str,
    regex: Regex,
    /// The regex ends right before the statement text, which runs until the
    /// next timestamp-prefixed line or the end of the message.
    captures_statement: bool,
}

/// Extracts slow-query records from raw log events.
pub struct SlowQueryParser {
    patterns: Vec<LogPattern>,
    next_entry: Regex,
}

impl Default for SlowQueryParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SlowQueryParser {
    pub fn new() -> Self {
        let pattern = |name, source: &str, captures_statement| LogPattern {
            name,
            regex: Regex::new(source).expect("built-in slow query pattern is valid"),
            captures_statement,
        };
        Self {
            patterns: vec![
                pattern("duration_statement", r"(?is)duration: ([\d.]+) ms\s+statement: ", true),
                pattern(
                    "prefixed_duration_statement",
                    r"(?is)\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2} UTC.*?duration: ([\d.]+) ms.*?statement: ",
                    true,
                ),
                pattern("loose_duration_statement", r"(?is)duration: ([\d.]+) ms.*?statement: ", true),
                pattern("duration_only", r"(?i)duration: ([\d.]+) ms", false),
            ],
            next_entry: Regex::new(r"\n\d{4}-\d{2}-\d{2}").expect("entry boundary pattern is valid"),
        }
    }

    /// Parses every event and returns the slow queries, slowest first.
    /// Records with equal durations keep their input order.
    pub fn parse_log_events(&self, events: &[LogEvent]) -> Vec<SlowQueryRecord> {
        let mut records: Vec<SlowQueryRecord> = events
            .iter()
            .flat_map(|event| self.parse_event(event))
            .filter(|record| record.duration_ms >= SLOW_QUERY_THRESHOLD_MS)
            .collect();
        records.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
        records
    }

    /// All records of the first pattern that matches the message, before the
    /// slow-query threshold is applied.
    fn parse_event(&self, event: &LogEvent) -> Vec<SlowQueryRecord> {
        for pattern in &self.patterns {
            let found = self.scan(pattern, &event.message, event.timestamp);
            if !found.is_empty() {
                tracing::trace!(pattern = pattern.name, count = found.len(), "Log line matched");
                return found;
            }
        }
        Vec::new()
    }

    fn scan(&self, pattern: &LogPattern, text: &str, timestamp: i64) -> Vec<SlowQueryRecord> {
        let mut records = Vec::new();
        let mut pos = 0;
        while pos <= text.len() {
            let Some(caps) = pattern.regex.captures_at(text, pos) else {
                break;
            };
            let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((pos, pos));
            let duration = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok());

            let (query, resume) = if pattern.captures_statement {
                match self.statement_end(text, whole.1) {
                    Some(end) => (text[whole.1..end].trim().to_string(), end),
                    None => {
                        pos = next_pos(text, whole);
                        continue;
                    }
                }
            } else {
                (NO_STATEMENT_TEXT.to_string(), whole.1)
            };

            match duration {
                Some(duration_ms) => records.push(SlowQueryRecord::new(timestamp, duration_ms, query)),
                None => tracing::debug!(pattern = pattern.name, "Unparseable duration in log line"),
            }
            pos = if resume > whole.0 { resume } else { next_pos(text, whole) };
        }
        records
    }

    /// End of a statement starting at `start`: the next line that begins with
    /// a date, a trailing newline, or the end of the message. The statement
    /// must be at least one character long.
    fn statement_end(&self, text: &str, start: usize) -> Option<usize> {
        let first = text[start..].chars().next()?;
        let min_end = start + first.len_utf8();

        let mut end = text.len();
        if text.ends_with('\n') && text.len() - 1 >= min_end {
            end = text.len() - 1;
        }
        if let Some(m) = self.next_entry.find_at(text, min_end) {
            end = end.min(m.start());
        }
        Some(end)
    }
}

fn next_pos(text: &str, (start, end): (usize, usize)) -> usize {
    if end > start {
        end
    } else {
        start + text[start..].chars().next().map_or(1, char::len_utf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(lines: &[&str]) -> Vec<SlowQueryRecord> {
        let events: Vec<LogEvent> = lines.iter().map(|l| LogEvent::new(*l, 0)).collect();
        SlowQueryParser::new().parse_log_events(&events)
    }

    #[test]
    fn test_duration_with_statement() {
        let records = parse(&["duration: 6100.5 ms statement: SELECT pg_sleep(6);"]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].duration_ms, 6100.5);
        assert_eq!(records[0].query, "SELECT pg_sleep(6);");
        assert_eq!(records[0].duration_seconds, 6.1005);
    }

    #[test]
    fn test_fast_statement_is_discarded() {
        assert!(parse(&["duration: 500 ms statement: SELECT 1;"]).is_empty());
    }

    #[test]
    fn test_rds_prefixed_line() {
        let line = "2024-03-01 12:00:00 UTC:10.0.0.1(5432):app@orders:[1234]:LOG:  duration: 2500.000 ms  statement: UPDATE orders SET state = 'done'";
        let records = parse(&[line]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].duration_ms, 2500.0);
        assert_eq!(records[0].query, "UPDATE orders SET state = 'done'");
    }

    #[test]
    fn test_statement_stops_at_next_timestamped_line() {
        let message = "duration: 1500 ms statement: SELECT *\n  FROM big_table\n2024-03-01 12:00:01 UTC:LOG: checkpoint starting\n";
        let records = parse(&[message]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].query, "SELECT *\n  FROM big_table");
    }

    #[test]
    fn test_loose_variant_with_text_between_duration_and_statement() {
        let records = parse(&["duration: 1200 ms  plan: seq scan statement: DELETE FROM sessions"]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].query, "DELETE FROM sessions");
    }

    #[test]
    fn test_duration_only_uses_sentinel() {
        let records = parse(&["LOG:  duration: 3000.25 ms  bind <unnamed>"]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].duration_ms, 3000.25);
        assert_eq!(records[0].query, NO_STATEMENT_TEXT);
    }

    #[test]
    fn test_case_insensitive() {
        let records = parse(&["DURATION: 1000 MS STATEMENT: VACUUM"]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].query, "VACUUM");
    }

    #[test]
    fn test_unmatched_and_malformed_lines_are_dropped() {
        let records = parse(&[
            "connection authorized: user=app database=orders",
            "duration: 1.2.3 ms",
            "",
        ]);
        assert!(records.is_empty());
    }

    #[test]
    fn test_multiple_entries_in_one_message() {
        let message = "duration: 1100 ms statement: SELECT 1\n2024-03-01 12:00:00 UTC:LOG:  duration: 2200 ms statement: SELECT 2";
        let records = parse(&[message]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].query, "SELECT 2");
        assert_eq!(records[1].query, "SELECT 1");
    }

    #[test]
    fn test_sorted_descending_and_stable() {
        let events = vec![
            LogEvent::new("duration: 2000 ms statement: first", 1),
            LogEvent::new("duration: 9000 ms statement: slowest", 2),
            LogEvent::new("duration: 2000 ms statement: second", 3),
        ];
        let records = SlowQueryParser::new().parse_log_events(&events);
        let queries: Vec<&str> = records.iter().map(|r| r.query.as_str()).collect();
        assert_eq!(queries, vec!["slowest", "first", "second"]);
        assert_eq!(records[0].timestamp, 2);
    }

    #[test]
    fn test_exactly_one_second_is_kept() {
        assert_eq!(parse(&["duration: 1000 ms statement: SELECT 1"]).len(), 1);
        assert!(parse(&["duration: 999.99 ms statement: SELECT 1"]).is_empty());
    }
}
