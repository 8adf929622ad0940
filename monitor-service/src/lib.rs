//! 数据库健康监控服务
//!
//! 提供以下后台能力：
//! - 按数据库轮询采集健康指标，并保留有界历史
//! - 周期性执行 Playbook 触发器并发出告警

pub mod collector;
pub mod executor;
pub mod history;
pub mod playbook;
pub mod registry;
pub mod source;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use collector::MetricsCollector;
pub use executor::{PoolExecutor, SqlExecutor};
pub use history::{HistoryBuffer, MetricHistory, HISTORY_CAPACITY};
pub use registry::{DatabaseRegistry, SqlRegistry, StaticRegistry};
pub use source::{DirectQuerySource, MetricSource, RemoteTelemetrySource, TelemetryBackend, UnconfiguredTelemetry};
pub use state::AppState;
