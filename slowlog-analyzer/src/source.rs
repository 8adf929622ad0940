//! Remote log service abstraction.
//!
//! Mirrors the group / stream / event hierarchy of CloudWatch Logs. The real
//! client lives outside this crate; [`StaticLogSource`] serves captured logs
//! from memory.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// One timestamped log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub message: String,
    /// Milliseconds since the epoch; 0 when the line carried no timestamp.
    #[serde(default)]
    pub timestamp: i64,
}

impl LogEvent {
    pub fn new(message: impl Into<String>, timestamp: i64) -> Self {
        Self {
            message: message.into(),
            timestamp,
        }
    }
}

/// Log retrieval collaborator.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Lists log group names belonging to an RDS instance or cluster.
    async fn list_log_groups(&self, identifier: &str) -> AppResult<Vec<String>>;

    /// Lists streams of a group, most recently written first.
    async fn list_log_streams(&self, log_group: &str, hours_back: u32) -> AppResult<Vec<String>>;

    /// Fetches the events of a stream within `[start_ms, end_ms]`.
    async fn get_log_events(
        &self,
        log_group: &str,
        log_stream: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> AppResult<Vec<LogEvent>>;
}

/// Log group name prefixes RDS uses for an instance and for a cluster.
pub fn rds_log_group_prefixes(identifier: &str) -> [String; 2] {
    [
        format!("/aws/rds/instance/{identifier}/"),
        format!("/aws/rds/cluster/{identifier}/"),
    ]
}

/// In-memory log source for replaying captured logs.
#[derive(Debug, Default)]
pub struct StaticLogSource {
    groups: BTreeMap<String, BTreeMap<String, Vec<LogEvent>>>,
    unreadable: HashSet<(String, String)>,
}

impl StaticLogSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends events to `group`/`stream`, creating both as needed.
    pub fn with_events(
        mut self,
        group: impl Into<String>,
        stream: impl Into<String>,
        events: Vec<LogEvent>,
    ) -> Self {
        self.groups
            .entry(group.into())
            .or_default()
            .entry(stream.into())
            .or_default()
            .extend(events);
        self
    }

    /// Marks a stream whose event fetch always fails.
    pub fn with_unreadable_stream(
        mut self,
        group: impl Into<String>,
        stream: impl Into<String>,
    ) -> Self {
        let (group, stream) = (group.into(), stream.into());
        self.groups
            .entry(group.clone())
            .or_default()
            .entry(stream.clone())
            .or_default();
        self.unreadable.insert((group, stream));
        self
    }
}

#[async_trait]
impl LogSource for StaticLogSource {
    async fn list_log_groups(&self, identifier: &str) -> AppResult<Vec<String>> {
        let prefixes = rds_log_group_prefixes(identifier);
        Ok(self
            .groups
            .keys()
            .filter(|name| prefixes.iter().any(|p| name.starts_with(p.as_str())))
            .cloned()
            .collect())
    }

    async fn list_log_streams(&self, log_group: &str, _hours_back: u32) -> AppResult<Vec<String>> {
        self.groups
            .get(log_group)
            .map(|streams| streams.keys().cloned().collect())
            .ok_or_else(|| AppError::LogSource(format!("log group not found: {log_group}")))
    }

    async fn get_log_events(
        &self,
        log_group: &str,
        log_stream: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> AppResult<Vec<LogEvent>> {
        if self
            .unreadable
            .contains(&(log_group.to_string(), log_stream.to_string()))
        {
            return Err(AppError::LogSource(format!(
                "access denied reading {log_group}/{log_stream}"
            )));
        }
        let events = self
            .groups
            .get(log_group)
            .and_then(|streams| streams.get(log_stream))
            .ok_or_else(|| {
                AppError::LogSource(format!("log stream not found: {log_group}/{log_stream}"))
            })?;
        Ok(events
            .iter()
            .filter(|e| e.timestamp >= start_ms && e.timestamp <= end_ms)
            .cloned()
            .collect())
    }
}
