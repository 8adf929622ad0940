//! Metric sources.
//!
//! A [`MetricSource`] turns one database descriptor into a [`MetricSample`].
//! [`DirectQuerySource`] runs a battery of diagnostic statements over SQL;
//! [`RemoteTelemetrySource`] asks a cloud metrics backend instead.

use std::sync::Arc;

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use common::models::database::{DatabaseDescriptor, DbEngine};
use common::models::monitor::MetricSample;
use common::models::query::QueryOutput;

use crate::executor::SqlExecutor;

/// Produces metric samples for a database.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Short label used in logs.
    fn kind(&self) -> &'static str;

    /// Collects one sample.
    ///
    /// # Errors
    /// Fails when the database (or backend) cannot be reached at all. Missing
    /// individual metrics leave the corresponding field empty instead.
    async fn collect(&self, descriptor: &DatabaseDescriptor) -> AppResult<MetricSample>;
}

// ---- PostgreSQL diagnostics ----

const PG_VERSION: &str = "SELECT version() AS version";
const PG_CONNECTIONS: &str = "SELECT count(*) AS total_connections,
        count(*) FILTER (WHERE state = 'active') AS active_connections
     FROM pg_stat_activity";
const PG_STATEMENT_CALLS: &str =
    "SELECT COALESCE(sum(calls), 0)::bigint AS total_calls FROM pg_stat_statements";
const PG_SLOW_STATEMENTS: &str =
    "SELECT count(*) AS slow_count FROM pg_stat_statements WHERE mean_exec_time > 1000";
// pg_stat_statements before PostgreSQL 13
const PG_SLOW_STATEMENTS_LEGACY: &str =
    "SELECT count(*) AS slow_count FROM pg_stat_statements WHERE mean_time > 1000";
const PG_UPTIME: &str =
    "SELECT EXTRACT(EPOCH FROM (now() - pg_postmaster_start_time()))::bigint AS uptime";
const PG_DATABASE_SIZE: &str = "SELECT pg_database_size(current_database()) AS db_size";

// ---- MySQL diagnostics ----

const MYSQL_VERSION: &str = "SELECT VERSION() AS version";
const MYSQL_STATUS: &str = "SHOW GLOBAL STATUS WHERE Variable_name IN \
     ('Threads_connected', 'Threads_running', 'Questions', 'Slow_queries', 'Uptime')";
const MYSQL_DATABASE_SIZE: &str = "SELECT CAST(COALESCE(SUM(data_length + index_length), 0) AS UNSIGNED) AS db_size
     FROM information_schema.TABLES WHERE table_schema = DATABASE()";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Collects metrics by querying the database directly.
pub struct DirectQuerySource {
    executor: Arc<dyn SqlExecutor>,
}

impl DirectQuerySource {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }

    /// Runs one diagnostic statement. A failing or overlong statement
    /// (missing view or extension, insufficient privilege, time limit) yields
    /// `None`; losing the connection aborts the whole sample.
    async fn diagnostic(&self, db: &DatabaseDescriptor, sql: &str) -> AppResult<Option<QueryOutput>> {
        match self.executor.execute(db, sql).await {
            Ok(output) => Ok(Some(output)),
            Err(AppError::DatabaseQuery(e)) => {
                tracing::warn!(db = %db.name, error = %e, "Diagnostic query failed, metric skipped");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn collect_postgres(&self, db: &DatabaseDescriptor) -> AppResult<MetricSample> {
        let mut sample = MetricSample::new(&db.name);

        if let Some(out) = self.diagnostic(db, PG_VERSION).await? {
            sample.version = out.get_str(0, "version");
        }

        if let Some(out) = self.diagnostic(db, PG_CONNECTIONS).await? {
            sample.total_connections = out.get_i64(0, "total_connections");
            sample.active_connections = out.get_i64(0, "active_connections");
        }

        if let Some(out) = self.diagnostic(db, PG_UPTIME).await? {
            sample.uptime_seconds = out.get_i64(0, "uptime");
        }

        // pg_stat_statements is an optional extension
        if let Some(out) = self.diagnostic(db, PG_STATEMENT_CALLS).await? {
            sample.queries_per_second = per_second(out.get_i64(0, "total_calls"), sample.uptime_seconds);
        }

        let slow = match self.diagnostic(db, PG_SLOW_STATEMENTS).await? {
            Some(out) => Some(out),
            None => self.diagnostic(db, PG_SLOW_STATEMENTS_LEGACY).await?,
        };
        if let Some(out) = slow {
            sample.slow_query_count = out.get_i64(0, "slow_count");
        }

        if let Some(out) = self.diagnostic(db, PG_DATABASE_SIZE).await? {
            sample.disk_usage_mb = out.get_f64(0, "db_size").map(|bytes| bytes / BYTES_PER_MB);
        }

        Ok(sample)
    }

    async fn collect_mysql(&self, db: &DatabaseDescriptor) -> AppResult<MetricSample> {
        let mut sample = MetricSample::new(&db.name);

        if let Some(out) = self.diagnostic(db, MYSQL_VERSION).await? {
            sample.version = out.get_str(0, "version").map(|v| format!("MySQL {v}"));
        }

        if let Some(out) = self.diagnostic(db, MYSQL_STATUS).await? {
            let mut questions = None;
            for row in 0..out.row_count() {
                let name = out.get_str(row, "Variable_name").unwrap_or_default();
                let value = out.get_i64(row, "Value");
                match name.as_str() {
                    "Threads_connected" => sample.total_connections = value,
                    "Threads_running" => sample.active_connections = value,
                    "Slow_queries" => sample.slow_query_count = value,
                    "Uptime" => sample.uptime_seconds = value,
                    "Questions" => questions = value,
                    _ => {}
                }
            }
            sample.queries_per_second = per_second(questions, sample.uptime_seconds);
        }

        if let Some(out) = self.diagnostic(db, MYSQL_DATABASE_SIZE).await? {
            sample.disk_usage_mb = out.get_f64(0, "db_size").map(|bytes| bytes / BYTES_PER_MB);
        }

        Ok(sample)
    }
}

fn per_second(total: Option<i64>, uptime_seconds: Option<i64>) -> Option<f64> {
    match (total, uptime_seconds) {
        (Some(total), Some(uptime)) if uptime > 0 => Some(total as f64 / uptime as f64),
        _ => None,
    }
}

#[async_trait]
impl MetricSource for DirectQuerySource {
    fn kind(&self) -> &'static str {
        "direct"
    }

    async fn collect(&self, descriptor: &DatabaseDescriptor) -> AppResult<MetricSample> {
        match descriptor.engine {
            DbEngine::Postgres => self.collect_postgres(descriptor).await,
            DbEngine::MySQL => self.collect_mysql(descriptor).await,
        }
    }
}

/// Metrics a cloud telemetry backend can report for a database instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteMetric {
    CpuUtilization,
    MemoryUtilization,
    DatabaseConnections,
}

impl RemoteMetric {
    /// CloudWatch metric name.
    pub fn name(&self) -> &'static str {
        match self {
            RemoteMetric::CpuUtilization => "CPUUtilization",
            RemoteMetric::MemoryUtilization => "MemoryUtilization",
            RemoteMetric::DatabaseConnections => "DatabaseConnections",
        }
    }
}

/// Cloud metrics backend (e.g. CloudWatch).
#[async_trait]
pub trait TelemetryBackend: Send + Sync {
    /// Latest datapoint of `metric` for the instance `cloudwatch_id`.
    async fn latest(&self, cloudwatch_id: &str, metric: RemoteMetric) -> AppResult<f64>;
}

/// Backend used when no cloud credentials are configured.
pub struct UnconfiguredTelemetry;

#[async_trait]
impl TelemetryBackend for UnconfiguredTelemetry {
    async fn latest(&self, cloudwatch_id: &str, metric: RemoteMetric) -> AppResult<f64> {
        Err(AppError::TelemetryUnavailable(format!(
            "no backend configured to read {} for {cloudwatch_id}",
            metric.name()
        )))
    }
}

/// Resolves the cloud identifier of a descriptor.
pub fn cloudwatch_id(descriptor: &DatabaseDescriptor) -> AppResult<&str> {
    descriptor
        .cloudwatch_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            AppError::Validation(format!("database {} has no cloudwatch_id", descriptor.name))
        })
}

/// Collects metrics from a cloud telemetry backend.
pub struct RemoteTelemetrySource {
    backend: Arc<dyn TelemetryBackend>,
}

impl RemoteTelemetrySource {
    pub fn new(backend: Arc<dyn TelemetryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl MetricSource for RemoteTelemetrySource {
    fn kind(&self) -> &'static str {
        "remote"
    }

    async fn collect(&self, descriptor: &DatabaseDescriptor) -> AppResult<MetricSample> {
        let id = cloudwatch_id(descriptor)?;
        let connections = self.backend.latest(id, RemoteMetric::DatabaseConnections).await?;

        let mut sample = MetricSample::new(&descriptor.name);
        sample.total_connections = Some(connections.round() as i64);
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeExecutor, FakeTelemetry};
    use serde_json::json;

    fn orders_db() -> DatabaseDescriptor {
        DatabaseDescriptor::postgres("orders", "10.0.0.5", "monitor", "pw", "orders")
    }

    #[tokio::test]
    async fn test_postgres_battery() {
        let source = DirectQuerySource::new(Arc::new(FakeExecutor::healthy_postgres()));
        let sample = source.collect(&orders_db()).await.unwrap();

        assert_eq!(sample.database_name, "orders");
        assert_eq!(sample.version.as_deref(), Some("PostgreSQL 16.2"));
        assert_eq!(sample.total_connections, Some(12));
        assert_eq!(sample.active_connections, Some(3));
        assert_eq!(sample.uptime_seconds, Some(600));
        assert_eq!(sample.queries_per_second, Some(2.0));
        assert_eq!(sample.slow_query_count, Some(4));
        assert_eq!(sample.disk_usage_mb, Some(50.0));
    }

    #[tokio::test]
    async fn test_missing_statistics_extension_leaves_fields_empty() {
        let executor = FakeExecutor::healthy_postgres()
            .fail_query("pg_stat_statements", "relation \"pg_stat_statements\" does not exist");
        let source = DirectQuerySource::new(Arc::new(executor));
        let sample = source.collect(&orders_db()).await.unwrap();

        assert_eq!(sample.queries_per_second, None);
        assert_eq!(sample.slow_query_count, None);
        assert_eq!(sample.total_connections, Some(12));
        assert_eq!(sample.disk_usage_mb, Some(50.0));
    }

    #[tokio::test]
    async fn test_slow_diagnostic_only_skips_its_metric() {
        let executor = FakeExecutor::healthy_postgres().time_out("pg_database_size");
        let source = DirectQuerySource::new(Arc::new(executor));
        let sample = source.collect(&orders_db()).await.unwrap();

        assert_eq!(sample.disk_usage_mb, None);
        assert_eq!(sample.version.as_deref(), Some("PostgreSQL 16.2"));
        assert_eq!(sample.total_connections, Some(12));
        assert_eq!(sample.slow_query_count, Some(4));
    }

    #[tokio::test]
    async fn test_legacy_slow_statement_column() {
        let executor = FakeExecutor::healthy_postgres()
            .fail_query("mean_exec_time", "column \"mean_exec_time\" does not exist")
            .respond("mean_time", QueryOutput::single(&["slow_count"], vec![json!(9)]));
        let source = DirectQuerySource::new(Arc::new(executor));
        let sample = source.collect(&orders_db()).await.unwrap();
        assert_eq!(sample.slow_query_count, Some(9));
    }

    #[tokio::test]
    async fn test_unreachable_database_fails_the_sample() {
        let source = DirectQuerySource::new(Arc::new(FakeExecutor::new().unreachable()));
        let err = source.collect(&orders_db()).await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseConnection(_)));
    }

    #[tokio::test]
    async fn test_mysql_battery() {
        let status = QueryOutput::new(
            vec!["Variable_name".into(), "Value".into()],
            vec![
                vec![json!("Questions"), json!("3000")],
                vec![json!("Slow_queries"), json!("2")],
                vec![json!("Threads_connected"), json!("8")],
                vec![json!("Threads_running"), json!("1")],
                vec![json!("Uptime"), json!("1000")],
            ],
        );
        let executor = FakeExecutor::new()
            .respond("VERSION()", QueryOutput::single(&["version"], vec![json!("8.0.36")]))
            .respond("SHOW GLOBAL STATUS", status)
            .respond("information_schema.TABLES", QueryOutput::single(&["db_size"], vec![json!(1_048_576)]));
        let db = orders_db().with_engine(DbEngine::MySQL);

        let sample = DirectQuerySource::new(Arc::new(executor)).collect(&db).await.unwrap();
        assert_eq!(sample.version.as_deref(), Some("MySQL 8.0.36"));
        assert_eq!(sample.total_connections, Some(8));
        assert_eq!(sample.active_connections, Some(1));
        assert_eq!(sample.slow_query_count, Some(2));
        assert_eq!(sample.uptime_seconds, Some(1000));
        assert_eq!(sample.queries_per_second, Some(3.0));
        assert_eq!(sample.disk_usage_mb, Some(1.0));
    }

    #[tokio::test]
    async fn test_remote_source_requires_cloudwatch_id() {
        let source = RemoteTelemetrySource::new(Arc::new(FakeTelemetry::new(5.0)));
        assert!(matches!(
            source.collect(&orders_db()).await,
            Err(AppError::Validation(_))
        ));

        let sample = source
            .collect(&orders_db().with_cloudwatch_id("orders-prod"))
            .await
            .unwrap();
        assert_eq!(sample.total_connections, Some(5));
    }

    #[tokio::test]
    async fn test_unconfigured_backend_is_unavailable() {
        let source = RemoteTelemetrySource::new(Arc::new(UnconfiguredTelemetry));
        let err = source
            .collect(&orders_db().with_cloudwatch_id("orders-prod"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TelemetryUnavailable(_)));
    }
}
