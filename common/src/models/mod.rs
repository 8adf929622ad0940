//! Shared data models for all services.

pub mod database;
pub mod monitor;
pub mod playbook;
pub mod query;
pub mod slow_query;

// Re-export commonly used types
pub use database::{DatabaseDescriptor, DbEngine};
pub use monitor::{MetricSample, MonitoringConfig};
pub use playbook::{Alert, ComparisonOperator, MetricKind, Playbook, Trigger};
pub use query::QueryOutput;
pub use slow_query::{
    DurationBuckets, LogFileAnalysis, SlowQueryAnalysis, SlowQueryRecord, SlowQueryReport,
    SlowQuerySummary, NO_STATEMENT_TEXT,
};
