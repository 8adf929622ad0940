//! Metric measurement tools used by playbook triggers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::errors::AppResult;
use common::models::database::{DatabaseDescriptor, DbEngine};
use common::models::playbook::{MetricKind, Trigger};

use crate::executor::SqlExecutor;
use crate::source::{cloudwatch_id, RemoteMetric, TelemetryBackend};

/// Upper bound on statements fetched by the slow-query lookup.
pub const SLOW_QUERY_LOOKUP_LIMIT: usize = 100;

/// Measures one metric of a database.
#[async_trait]
pub trait MetricTool: Send + Sync {
    async fn measure(&self, descriptor: &DatabaseDescriptor, trigger: &Trigger) -> AppResult<f64>;
}

/// Reads the latest value of a cloud telemetry metric.
pub struct RemoteMetricTool {
    backend: Arc<dyn TelemetryBackend>,
    metric: RemoteMetric,
}

impl RemoteMetricTool {
    pub fn new(backend: Arc<dyn TelemetryBackend>, metric: RemoteMetric) -> Self {
        Self { backend, metric }
    }
}

#[async_trait]
impl MetricTool for RemoteMetricTool {
    async fn measure(&self, descriptor: &DatabaseDescriptor, _trigger: &Trigger) -> AppResult<f64> {
        let id = cloudwatch_id(descriptor)?;
        self.backend.latest(id, self.metric).await
    }
}

/// Counts statements whose mean execution time reaches the trigger's
/// `min_duration_seconds`.
pub struct SlowQueryTool {
    executor: Arc<dyn SqlExecutor>,
}

impl SlowQueryTool {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }

    fn lookup_sql(engine: DbEngine, min_duration_seconds: f64) -> String {
        let min_ms = min_duration_seconds.max(0.0) * 1000.0;
        match engine {
            DbEngine::Postgres => format!(
                "SELECT query, mean_exec_time FROM pg_stat_statements \
                 WHERE mean_exec_time >= {min_ms:.3} ORDER BY mean_exec_time DESC LIMIT {SLOW_QUERY_LOOKUP_LIMIT}"
            ),
            // timer columns are in picoseconds
            DbEngine::MySQL => format!(
                "SELECT DIGEST_TEXT, AVG_TIMER_WAIT FROM performance_schema.events_statements_summary_by_digest \
                 WHERE AVG_TIMER_WAIT >= {:.0} ORDER BY AVG_TIMER_WAIT DESC LIMIT {SLOW_QUERY_LOOKUP_LIMIT}",
                min_ms * 1e9
            ),
        }
    }
}

#[async_trait]
impl MetricTool for SlowQueryTool {
    async fn measure(&self, descriptor: &DatabaseDescriptor, trigger: &Trigger) -> AppResult<f64> {
        let sql = Self::lookup_sql(descriptor.engine, trigger.min_duration_seconds());
        let output = self.executor.execute(descriptor, &sql).await?;
        Ok(output.row_count() as f64)
    }
}

/// Fixed mapping from trigger metric to measurement tool.
#[derive(Default)]
pub struct MetricToolRegistry {
    tools: HashMap<MetricKind, Arc<dyn MetricTool>>,
}

impl MetricToolRegistry {
    /// CPU and memory from cloud telemetry, slow queries from the statement
    /// statistics of the database itself.
    pub fn standard(executor: Arc<dyn SqlExecutor>, telemetry: Arc<dyn TelemetryBackend>) -> Self {
        Self::default()
            .with_tool(
                MetricKind::CpuUsage,
                Arc::new(RemoteMetricTool::new(telemetry.clone(), RemoteMetric::CpuUtilization)),
            )
            .with_tool(
                MetricKind::MemoryUsage,
                Arc::new(RemoteMetricTool::new(telemetry, RemoteMetric::MemoryUtilization)),
            )
            .with_tool(MetricKind::SlowQueries, Arc::new(SlowQueryTool::new(executor)))
    }

    pub fn with_tool(mut self, kind: MetricKind, tool: Arc<dyn MetricTool>) -> Self {
        self.tools.insert(kind, tool);
        self
    }

    /// Tool measuring the metric of `trigger`. Unknown names yield `None`.
    pub fn tool_for(&self, trigger: &Trigger) -> Option<Arc<dyn MetricTool>> {
        self.tools.get(&trigger.metric_kind()?).cloned()
    }
}
