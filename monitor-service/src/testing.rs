//! Test doubles shared by the unit tests of this crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use common::errors::{AppError, AppResult};
use common::models::database::DatabaseDescriptor;
use common::models::query::QueryOutput;
use serde_json::json;

use crate::executor::{statement_timed_out, SqlExecutor};
use crate::source::{RemoteMetric, TelemetryBackend};

enum Canned {
    Rows(QueryOutput),
    QueryError(String),
    TimedOut,
}

/// Executor answering from canned responses keyed by a SQL substring.
/// Rules added later take precedence over earlier ones.
#[derive(Default)]
pub(crate) struct FakeExecutor {
    rules: Vec<(String, Canned)>,
    unreachable: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    released: Mutex<Vec<String>>,
}

impl FakeExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A PostgreSQL server with every diagnostic available.
    pub(crate) fn healthy_postgres() -> Self {
        Self::new()
            .respond("version()", QueryOutput::single(&["version"], vec![json!("PostgreSQL 16.2")]))
            .respond(
                "pg_stat_activity",
                QueryOutput::single(&["total_connections", "active_connections"], vec![json!(12), json!(3)]),
            )
            .respond("pg_postmaster_start_time", QueryOutput::single(&["uptime"], vec![json!(600)]))
            .respond("sum(calls)", QueryOutput::single(&["total_calls"], vec![json!(1200)]))
            .respond("mean_exec_time", QueryOutput::single(&["slow_count"], vec![json!(4)]))
            .respond("pg_database_size", QueryOutput::single(&["db_size"], vec![json!(52_428_800)]))
    }

    pub(crate) fn respond(mut self, needle: &str, output: QueryOutput) -> Self {
        self.rules.push((needle.to_string(), Canned::Rows(output)));
        self
    }

    pub(crate) fn fail_query(mut self, needle: &str, message: &str) -> Self {
        self.rules.push((needle.to_string(), Canned::QueryError(message.to_string())));
        self
    }

    /// Statements matching `needle` run past the executor's time limit.
    pub(crate) fn time_out(mut self, needle: &str) -> Self {
        self.rules.push((needle.to_string(), Canned::TimedOut));
        self
    }

    pub(crate) fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlExecutor for FakeExecutor {
    async fn execute(&self, _descriptor: &DatabaseDescriptor, sql: &str) -> AppResult<QueryOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable {
            return Err(AppError::DatabaseConnection("connection refused".into()));
        }
        match self.rules.iter().rev().find(|(needle, _)| sql.contains(needle.as_str())) {
            Some((_, Canned::Rows(output))) => Ok(output.clone()),
            Some((_, Canned::QueryError(message))) => Err(AppError::DatabaseQuery(message.clone())),
            Some((_, Canned::TimedOut)) => Err(statement_timed_out(Duration::from_secs(5))),
            None => Err(AppError::DatabaseQuery(format!("no canned response for: {sql}"))),
        }
    }

    async fn release(&self, name: &str) {
        self.released.lock().unwrap().push(name.to_string());
    }
}

/// Telemetry backend reporting one fixed value for every metric.
pub(crate) struct FakeTelemetry {
    value: f64,
}

impl FakeTelemetry {
    pub(crate) fn new(value: f64) -> Self {
        Self { value }
    }
}

#[async_trait]
impl TelemetryBackend for FakeTelemetry {
    async fn latest(&self, _cloudwatch_id: &str, _metric: RemoteMetric) -> AppResult<f64> {
        Ok(self.value)
    }
}
