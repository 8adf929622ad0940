//! Application state for the monitor service.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::config::AppConfig;
use common::errors::AppResult;
use common::models::monitor::MonitoringConfig;
use tokio_util::sync::CancellationToken;

use crate::collector::MetricsCollector;
use crate::executor::{PoolExecutor, SqlExecutor};
use crate::playbook::{LogAlertSink, MetricToolRegistry, PlaybookEngine};
use crate::registry::DatabaseRegistry;
use crate::source::{TelemetryBackend, UnconfiguredTelemetry};

/// Components shared by the background loops.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub executor: Arc<dyn SqlExecutor>,
    pub registry: Arc<dyn DatabaseRegistry>,
    pub collector: Arc<MetricsCollector>,
    pub engine: Arc<PlaybookEngine>,
}

impl AppState {
    /// Creates the state with pooled SQL execution and no cloud telemetry.
    pub fn new(config: AppConfig, registry: Arc<dyn DatabaseRegistry>) -> Self {
        let executor: Arc<dyn SqlExecutor> = Arc::new(PoolExecutor::new(&config));
        Self::with_components(config, registry, executor, Arc::new(UnconfiguredTelemetry))
    }

    pub fn with_components(
        config: AppConfig,
        registry: Arc<dyn DatabaseRegistry>,
        executor: Arc<dyn SqlExecutor>,
        telemetry: Arc<dyn TelemetryBackend>,
    ) -> Self {
        let collector = Arc::new(MetricsCollector::new(executor.clone(), telemetry.clone(), &config));
        let tools = MetricToolRegistry::standard(executor.clone(), telemetry);
        let engine = Arc::new(PlaybookEngine::from_config(&config, tools, Arc::new(LogAlertSink)));
        Self {
            config,
            executor,
            registry,
            collector,
            engine,
        }
    }

    /// Aligns the monitored databases with the registry: registered databases
    /// are added (or updated), unregistered ones removed. Returns the number
    /// of monitored databases.
    pub async fn sync_databases(&self) -> AppResult<usize> {
        let databases = self.registry.list_databases().await?;
        let registered: HashSet<String> = databases.iter().map(|d| d.name.clone()).collect();

        for name in self.collector.monitored_databases().await {
            if !registered.contains(&name) {
                self.collector.remove_database(&name).await;
            }
        }
        for descriptor in databases {
            let mut config = MonitoringConfig::new(&descriptor.name);
            config.check_interval_seconds = self.config.monitor_interval_secs;
            self.collector.add_database(descriptor, config).await;
        }
        Ok(registered.len())
    }

    /// Re-synchronizes with the registry every monitoring interval until
    /// `cancel` fires.
    pub async fn run_registry_sync(&self, cancel: CancellationToken) {
        let interval = Duration::from_secs(self.config.monitor_interval_secs.max(1));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            match self.sync_databases().await {
                Ok(count) => tracing::debug!(databases = count, "Monitored databases synchronized"),
                Err(e) => tracing::warn!(error = %e, "Could not synchronize monitored databases"),
            }
        }
    }
}
