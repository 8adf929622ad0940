//! Background metrics collection.
//!
//! [`MetricsCollector`] owns the monitored databases, their metric sources
//! and bounded histories, and runs a polling scheduler as a tokio task that
//! is stopped through a [`CancellationToken`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::config::AppConfig;
use common::models::database::DatabaseDescriptor;
use common::models::monitor::{MetricSample, MonitoringConfig};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

use crate::executor::SqlExecutor;
use crate::history::{HistoryBuffer, MetricHistory};
use crate::source::{DirectQuerySource, MetricSource, RemoteTelemetrySource, TelemetryBackend};

/// Shortest pause between two scheduler passes.
const MIN_PAUSE: Duration = Duration::from_millis(10);

struct MonitoredDatabase {
    descriptor: DatabaseDescriptor,
    config: MonitoringConfig,
    source: Arc<dyn MetricSource>,
    history: HistoryBuffer,
    /// Distinguishes a re-added database from the removed one, so that a
    /// collection started before the removal is never recorded.
    generation: u64,
    next_due: Instant,
}

impl MonitoredDatabase {
    fn interval(&self) -> Duration {
        Duration::from_secs(self.config.check_interval_seconds.max(1))
    }
}

/// A database picked for collection in the current pass.
struct CollectionTarget {
    descriptor: DatabaseDescriptor,
    source: Arc<dyn MetricSource>,
    generation: u64,
}

struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Polls every monitored database and keeps the latest samples in memory.
pub struct MetricsCollector {
    executor: Arc<dyn SqlExecutor>,
    direct: Arc<dyn MetricSource>,
    remote: Arc<dyn MetricSource>,
    base_interval: Duration,
    collect_timeout: Duration,
    databases: RwLock<HashMap<String, MonitoredDatabase>>,
    generations: AtomicU64,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl MetricsCollector {
    pub fn new(
        executor: Arc<dyn SqlExecutor>,
        telemetry: Arc<dyn TelemetryBackend>,
        config: &AppConfig,
    ) -> Self {
        Self {
            direct: Arc::new(DirectQuerySource::new(executor.clone())),
            remote: Arc::new(RemoteTelemetrySource::new(telemetry)),
            executor,
            base_interval: Duration::from_secs(config.monitor_interval_secs.max(1)),
            collect_timeout: Duration::from_secs(config.collect_timeout_secs.max(1)),
            databases: RwLock::new(HashMap::new()),
            generations: AtomicU64::new(0),
            scheduler: Mutex::new(None),
        }
    }

    /// Overrides the longest pause between passes and the per-database
    /// collection timeout.
    pub fn with_timing(mut self, base_interval: Duration, collect_timeout: Duration) -> Self {
        self.base_interval = base_interval.max(MIN_PAUSE);
        self.collect_timeout = collect_timeout;
        self
    }

    /// Registers `descriptor` for monitoring, or replaces its descriptor and
    /// config. The history of an already monitored name is kept, and so is
    /// its schedule unless the interval or enabled flag changed.
    pub async fn add_database(&self, descriptor: DatabaseDescriptor, mut config: MonitoringConfig) {
        config.database_name = descriptor.name.clone();
        let source = if config.use_remote_telemetry {
            self.remote.clone()
        } else {
            self.direct.clone()
        };

        let mut databases = self.databases.write().await;
        match databases.get_mut(&descriptor.name) {
            Some(entry) => {
                let reschedule = entry.config.check_interval_seconds != config.check_interval_seconds
                    || entry.config.is_enabled != config.is_enabled;
                entry.descriptor = descriptor;
                entry.config = config;
                entry.source = source;
                if reschedule {
                    entry.next_due = Instant::now();
                    tracing::info!(
                        db = %entry.descriptor.name,
                        source = entry.source.kind(),
                        interval_secs = entry.config.check_interval_seconds,
                        enabled = entry.config.is_enabled,
                        "Monitoring schedule replaced"
                    );
                } else {
                    tracing::debug!(db = %entry.descriptor.name, source = entry.source.kind(), "Monitoring config refreshed");
                }
            }
            None => {
                let name = descriptor.name.clone();
                tracing::info!(
                    db = %name,
                    source = source.kind(),
                    interval_secs = config.check_interval_seconds,
                    enabled = config.is_enabled,
                    "Database added to monitoring"
                );
                databases.insert(
                    name,
                    MonitoredDatabase {
                        descriptor,
                        config,
                        source,
                        history: HistoryBuffer::default(),
                        generation: self.generations.fetch_add(1, Ordering::Relaxed),
                        next_due: Instant::now(),
                    },
                );
            }
        }
    }

    /// Stops monitoring `name` and discards its history. Returns whether the
    /// name was monitored.
    pub async fn remove_database(&self, name: &str) -> bool {
        let removed = self.databases.write().await.remove(name);
        match removed {
            Some(_) => {
                self.executor.release(name).await;
                tracing::info!(db = %name, "Database removed from monitoring");
                true
            }
            None => false,
        }
    }

    /// Names of all monitored databases.
    pub async fn monitored_databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Launches the scheduler unless it is already running.
    pub async fn start_monitoring(self: &Arc<Self>) {
        let mut scheduler = self.scheduler.lock().await;
        if scheduler.as_ref().is_some_and(|h| !h.task.is_finished()) {
            tracing::debug!("Monitoring scheduler already running");
            return;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.clone().run_scheduler(cancel.clone()));
        *scheduler = Some(SchedulerHandle { cancel, task });
        tracing::info!(base_interval_secs = self.base_interval.as_secs(), "Monitoring scheduler started");
    }

    /// Signals the scheduler to exit and waits until it has. No sample is
    /// recorded after this returns.
    pub async fn stop_monitoring(&self) {
        let handle = self.scheduler.lock().await.take();
        let Some(handle) = handle else {
            return;
        };
        handle.cancel.cancel();
        if let Err(e) = handle.task.await {
            tracing::error!(error = %e, "Monitoring scheduler terminated abnormally");
        }
        tracing::info!("Monitoring scheduler stopped");
    }

    pub async fn is_monitoring(&self) -> bool {
        self.scheduler
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.task.is_finished())
    }

    /// Collects one sample for `descriptor` without recording it. Any
    /// collection failure is logged and yields `None`.
    pub async fn collect_once(&self, descriptor: &DatabaseDescriptor) -> Option<MetricSample> {
        let source = self
            .databases
            .read()
            .await
            .get(&descriptor.name)
            .map(|entry| entry.source.clone())
            .unwrap_or_else(|| self.direct.clone());
        self.collect_with(source, descriptor.clone()).await
    }

    /// Most recent sample of `name`.
    pub async fn latest_sample(&self, name: &str) -> Option<MetricSample> {
        self.databases
            .read()
            .await
            .get(name)
            .and_then(|entry| entry.history.latest().cloned())
    }

    /// Samples of `name` from the last `hours` hours, oldest first. Unknown
    /// names yield an empty history.
    pub async fn history(&self, name: &str, hours: u32) -> MetricHistory {
        let cutoff = chrono::Duration::try_hours(i64::from(hours))
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let databases = self.databases.read().await;
        match databases.get(name) {
            Some(entry) => MetricHistory::new(entry.history.since(cutoff)),
            None => MetricHistory::default(),
        }
    }

    /// Appends `sample` to the history of `name` if the database is still the
    /// one the sample was collected for.
    pub(crate) async fn record_sample(&self, name: &str, generation: u64, sample: MetricSample) -> bool {
        let mut databases = self.databases.write().await;
        match databases.get_mut(name) {
            Some(entry) if entry.generation == generation => {
                entry.history.push(sample);
                true
            }
            _ => {
                tracing::debug!(db = %name, "Discarding sample of a removed database");
                false
            }
        }
    }

    async fn collect_with(
        &self,
        source: Arc<dyn MetricSource>,
        descriptor: DatabaseDescriptor,
    ) -> Option<MetricSample> {
        let name = descriptor.name.clone();
        let kind = source.kind();
        // A panicking or hanging source only affects its own task. The task
        // is aborted when this future is dropped, e.g. on scheduler stop.
        let mut task = AbortOnDropHandle::new(tokio::spawn(async move { source.collect(&descriptor).await }));

        match tokio::time::timeout(self.collect_timeout, &mut task).await {
            Ok(Ok(Ok(sample))) => {
                tracing::debug!(db = %name, source = kind, "Metrics collected");
                Some(sample)
            }
            Ok(Ok(Err(e))) if e.is_transient() => {
                tracing::warn!(db = %name, source = kind, error = %e, "Metrics collection failed");
                None
            }
            Ok(Ok(Err(e))) => {
                tracing::error!(db = %name, source = kind, error = %e, "Metrics collection misconfigured");
                None
            }
            Ok(Err(e)) => {
                tracing::error!(db = %name, source = kind, error = %e, "Metrics collection task failed");
                None
            }
            Err(_) => {
                task.abort();
                tracing::warn!(
                    db = %name,
                    source = kind,
                    timeout_secs = self.collect_timeout.as_secs(),
                    "Metrics collection timed out"
                );
                None
            }
        }
    }

    /// Enabled databases whose interval has elapsed, marked as collected.
    async fn take_due(&self) -> Vec<CollectionTarget> {
        let now = Instant::now();
        let mut databases = self.databases.write().await;
        let mut due: Vec<CollectionTarget> = databases
            .values_mut()
            .filter(|entry| entry.config.is_enabled && entry.next_due <= now)
            .map(|entry| {
                entry.next_due = now + entry.interval();
                CollectionTarget {
                    descriptor: entry.descriptor.clone(),
                    source: entry.source.clone(),
                    generation: entry.generation,
                }
            })
            .collect();
        due.sort_by(|a, b| a.descriptor.name.cmp(&b.descriptor.name));
        due
    }

    /// Time until the next enabled database is due, capped by the base
    /// interval.
    async fn next_pause(&self) -> Duration {
        let now = Instant::now();
        self.databases
            .read()
            .await
            .values()
            .filter(|entry| entry.config.is_enabled)
            .map(|entry| entry.next_due.saturating_duration_since(now))
            .min()
            .unwrap_or(self.base_interval)
            .clamp(MIN_PAUSE, self.base_interval)
    }

    async fn run_scheduler(self: Arc<Self>, cancel: CancellationToken) {
        'scheduler: loop {
            for target in self.take_due().await {
                if cancel.is_cancelled() {
                    break 'scheduler;
                }
                let name = target.descriptor.name.clone();
                let sample = tokio::select! {
                    _ = cancel.cancelled() => break 'scheduler,
                    sample = self.collect_with(target.source, target.descriptor) => sample,
                };
                if let Some(sample) = sample {
                    self.record_sample(&name, target.generation, sample).await;
                }
            }

            let pause = self.next_pause().await;
            tokio::select! {
                _ = cancel.cancelled() => break 'scheduler,
                _ = tokio::time::sleep(pause) => {}
            }
        }
        tracing::debug!("Monitoring scheduler exiting");
    }
}
