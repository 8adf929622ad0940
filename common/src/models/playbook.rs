//! Playbook, trigger and alert models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

use super::database::DatabaseDescriptor;

/// Metrics a trigger may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    CpuUsage,
    MemoryUsage,
    SlowQueries,
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu_usage" => Ok(Self::CpuUsage),
            "memory_usage" => Ok(Self::MemoryUsage),
            "slow_queries" => Ok(Self::SlowQueries),
            _ => Err(format!("unknown metric: {s}")),
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CpuUsage => write!(f, "cpu_usage"),
            Self::MemoryUsage => write!(f, "memory_usage"),
            Self::SlowQueries => write!(f, "slow_queries"),
        }
    }
}

/// Comparison between a measured value and a trigger threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    Equal,
}

impl FromStr for ComparisonOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(Self::GreaterThan),
            ">=" => Ok(Self::GreaterEqual),
            "<" => Ok(Self::LessThan),
            "<=" => Ok(Self::LessEqual),
            "==" => Ok(Self::Equal),
            _ => Err(format!("unknown compare operator: {s}")),
        }
    }
}

impl std::fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Self::GreaterThan => ">",
            Self::GreaterEqual => ">=",
            Self::LessThan => "<",
            Self::LessEqual => "<=",
            Self::Equal => "==",
        };
        f.write_str(symbol)
    }
}

impl ComparisonOperator {
    /// Applies the comparison `value <op> threshold`.
    pub fn check(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::GreaterEqual => value >= threshold,
            Self::LessThan => value < threshold,
            Self::LessEqual => value <= threshold,
            Self::Equal => value == threshold,
        }
    }
}

/// A single metric/operator/threshold condition.
///
/// `metric` and `operator` are kept as the raw configured strings so that an
/// unknown value only disables the trigger instead of the whole playbook file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Trigger {
    #[validate(length(min = 1, message = "Trigger metric is required"))]
    pub metric: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    pub threshold: f64,
    /// Opaque label forwarded to the alert consumer.
    #[serde(default)]
    pub action: String,
    /// Minimum statement duration counted by `slow_queries`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, message = "min_duration_seconds must not be negative"))]
    pub min_duration_seconds: Option<f64>,
}

fn default_operator() -> String {
    "==".to_string()
}

impl Trigger {
    /// Default slow-query duration when the trigger does not set one.
    pub const DEFAULT_MIN_DURATION_SECONDS: f64 = 5.0;

    /// Parsed metric, or `None` for names outside the fixed set.
    pub fn metric_kind(&self) -> Option<MetricKind> {
        self.metric.parse().ok()
    }

    pub fn min_duration_seconds(&self) -> f64 {
        self.min_duration_seconds
            .unwrap_or(Self::DEFAULT_MIN_DURATION_SECONDS)
    }
}

/// A named group of triggers bound to one database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Playbook {
    #[validate(length(min = 1, message = "Playbook name is required"))]
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[validate(length(min = 1, message = "Playbook database_name is required"))]
    pub database_name: String,
    #[serde(default)]
    #[validate(nested)]
    pub triggers: Vec<Trigger>,
}

/// Alert raised when a trigger condition holds.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    /// Unique alert identifier.
    pub id: String,
    /// Name of the playbook that owns the trigger.
    pub playbook: String,
    pub trigger: Trigger,
    pub measured_value: f64,
    pub database: DatabaseDescriptor,
    pub timestamp: DateTime<Utc>,
}
