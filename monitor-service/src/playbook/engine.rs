//! Periodic playbook evaluation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::config::AppConfig;
use common::models::database::DatabaseDescriptor;
use common::models::playbook::{Alert, ComparisonOperator, Playbook, Trigger};
use common::utils::IdGenerator;
use tokio_util::sync::CancellationToken;

use super::alert::AlertSink;
use super::loader::load_playbooks;
use super::tools::MetricToolRegistry;
use crate::registry::DatabaseRegistry;

/// `value <operator> threshold`. Unrecognized operators never match.
pub fn condition_met(value: f64, operator: &str, threshold: f64) -> bool {
    operator
        .parse::<ComparisonOperator>()
        .map(|op| op.check(value, threshold))
        .unwrap_or(false)
}

/// Evaluates playbook triggers against live metrics and emits alerts.
pub struct PlaybookEngine {
    playbooks: Vec<Playbook>,
    tools: MetricToolRegistry,
    sink: Arc<dyn AlertSink>,
    interval: Duration,
}

impl PlaybookEngine {
    pub fn new(
        playbooks: Vec<Playbook>,
        tools: MetricToolRegistry,
        sink: Arc<dyn AlertSink>,
        interval: Duration,
    ) -> Self {
        Self {
            playbooks,
            tools,
            sink,
            interval,
        }
    }

    /// Loads playbooks from the configured file; an unreadable file leaves
    /// the engine with no playbooks.
    pub fn from_config(config: &AppConfig, tools: MetricToolRegistry, sink: Arc<dyn AlertSink>) -> Self {
        Self::new(
            load_playbooks(&config.playbook_path),
            tools,
            sink,
            Duration::from_secs(config.playbook_interval_secs.max(1)),
        )
    }

    pub fn playbooks(&self) -> &[Playbook] {
        &self.playbooks
    }

    /// Runs every enabled playbook once against `databases` and returns the
    /// alerts raised, in playbook and trigger order.
    pub async fn run_cycle(&self, databases: &[DatabaseDescriptor]) -> Vec<Alert> {
        let mut alerts = Vec::new();
        for playbook in self.playbooks.iter().filter(|p| p.enabled) {
            let Some(database) = databases.iter().find(|d| d.name == playbook.database_name) else {
                tracing::warn!(
                    playbook = %playbook.name,
                    db = %playbook.database_name,
                    "No registered database for playbook, skipping"
                );
                continue;
            };

            tracing::debug!(playbook = %playbook.name, db = %database.name, "Running playbook");
            for trigger in &playbook.triggers {
                if let Some(alert) = self.evaluate(playbook, trigger, database).await {
                    self.sink.emit(&alert);
                    alerts.push(alert);
                }
            }
        }
        alerts
    }

    async fn evaluate(&self, playbook: &Playbook, trigger: &Trigger, database: &DatabaseDescriptor) -> Option<Alert> {
        let Some(tool) = self.tools.tool_for(trigger) else {
            tracing::warn!(playbook = %playbook.name, metric = %trigger.metric, "Unknown metric in trigger, skipping");
            return None;
        };

        let value = match tool.measure(database, trigger).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    playbook = %playbook.name,
                    db = %database.name,
                    metric = %trigger.metric,
                    error = %e,
                    "Metric measurement failed"
                );
                return None;
            }
        };

        let met = condition_met(value, &trigger.operator, trigger.threshold);
        tracing::info!(
            playbook = %playbook.name,
            db = %database.name,
            metric = %trigger.metric,
            value,
            operator = %trigger.operator,
            threshold = trigger.threshold,
            met,
            "Trigger checked"
        );
        met.then(|| Alert {
            id: IdGenerator::alert_id(),
            playbook: playbook.name.clone(),
            trigger: trigger.clone(),
            measured_value: value,
            database: database.clone(),
            timestamp: Utc::now(),
        })
    }

    /// Refreshes the database list from `registry` and runs a cycle every
    /// interval until `cancel` fires.
    pub async fn run(&self, registry: Arc<dyn DatabaseRegistry>, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            playbooks = self.playbooks.len(),
            "Playbook engine started"
        );

        loop {
            let cycle = IdGenerator::short_id();
            let databases = match registry.list_databases().await {
                Ok(databases) => databases,
                Err(e) => {
                    tracing::warn!(cycle = %cycle, error = %e, "Could not refresh registered databases");
                    Vec::new()
                }
            };

            if databases.is_empty() {
                tracing::warn!(cycle = %cycle, "No databases registered, skipping playbook check");
            } else {
                let alerts = self.run_cycle(&databases).await;
                tracing::info!(cycle = %cycle, databases = databases.len(), alerts = alerts.len(), "Playbook cycle finished");
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        tracing::info!("Playbook engine stopped");
    }
}
