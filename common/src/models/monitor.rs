//! Monitoring and performance metrics models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One point-in-time measurement of a database's health.
///
/// Every metric is optional: a field the source could not produce stays
/// `None` instead of defaulting to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Name of the monitored database.
    pub database_name: String,
    /// Collection time.
    pub timestamp: DateTime<Utc>,
    /// Connections currently executing a statement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_connections: Option<i64>,
    /// All open connections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_connections: Option<i64>,
    /// Queries per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queries_per_second: Option<f64>,
    /// Statements whose mean execution time exceeds one second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_query_count: Option<i64>,
    /// On-disk size in megabytes.
    #[serde(rename = "disk_usage_mb", skip_serializing_if = "Option::is_none")]
    pub disk_usage_mb: Option<f64>,
    /// Server uptime in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<i64>,
    /// Server version string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl MetricSample {
    /// Creates an empty sample stamped with the current time.
    pub fn new(database_name: impl Into<String>) -> Self {
        Self::at(database_name, Utc::now())
    }

    /// Creates an empty sample with an explicit timestamp.
    pub fn at(database_name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            database_name: database_name.into(),
            timestamp,
            active_connections: None,
            total_connections: None,
            queries_per_second: None,
            slow_query_count: None,
            disk_usage_mb: None,
            uptime_seconds: None,
            version: None,
        }
    }
}

/// Per-database monitoring settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Name of the monitored database.
    pub database_name: String,
    /// Desired seconds between two samples.
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    /// Disabled configs are kept but skipped by the scheduler.
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    /// Collect through the remote telemetry backend instead of SQL.
    #[serde(default)]
    pub use_remote_telemetry: bool,
}

fn default_check_interval() -> u64 {
    60
}

fn default_enabled() -> bool {
    true
}

impl MonitoringConfig {
    /// Creates an enabled direct-query config with the default interval.
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            check_interval_seconds: default_check_interval(),
            is_enabled: true,
            use_remote_telemetry: false,
        }
    }
}
