//! 数据库健康监控服务
//!
//! 启动后：
//! - 从应用库的 `databases` 表读取已注册数据库
//! - 启动指标采集调度器
//! - 启动 Playbook 告警引擎
//! - 收到 Ctrl-C 后停止所有后台任务

use std::sync::Arc;

use anyhow::Context;
use common::config::{load_dotenv, AppConfig};
use monitor_service::{AppState, SqlRegistry};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "monitor-service";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (if present) before anything else
    load_dotenv();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME);

    // 初始化日志追踪
    init_tracing(config.json_logs);

    // 已注册数据库（应用库）
    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL must point at the application database")?;
    let registry = SqlRegistry::connect(&database_url, &config)
        .await
        .context("Failed to connect to the application database (check DATABASE_URL)")?;

    let state = AppState::new(config, Arc::new(registry));
    let monitored = state
        .sync_databases()
        .await
        .context("Failed to read registered databases")?;
    info!(
        service = SERVICE_NAME,
        databases = monitored,
        playbooks = state.engine.playbooks().len(),
        "启动服务"
    );

    // 后台任务
    let cancel = CancellationToken::new();
    state.collector.start_monitoring().await;

    let engine_task = tokio::spawn({
        let engine = state.engine.clone();
        let registry = state.registry.clone();
        let cancel = cancel.clone();
        async move { engine.run(registry, cancel).await }
    });
    let sync_task = tokio::spawn({
        let state = state.clone();
        let cancel = cancel.clone();
        async move { state.run_registry_sync(cancel).await }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("收到停止信号，正在关闭");

    cancel.cancel();
    state.collector.stop_monitoring().await;
    engine_task.await.context("Playbook engine task failed")?;
    sync_task.await.context("Registry sync task failed")?;

    info!("服务已停止");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
