//! Registered-database lookup.

use std::time::Duration;

use async_trait::async_trait;
use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::database::{DatabaseDescriptor, DbEngine};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::RwLock;
use validator::Validate;

/// Source of the current set of monitored databases.
#[async_trait]
pub trait DatabaseRegistry: Send + Sync {
    /// Every registered database. Names are unique.
    async fn list_databases(&self) -> AppResult<Vec<DatabaseDescriptor>>;
}

/// Row from the `databases` table.
#[derive(sqlx::FromRow)]
struct DatabaseRow {
    name: String,
    host: String,
    port: Option<i32>,
    username: String,
    password: Option<String>,
    dbname: String,
    cloudwatch_id: Option<String>,
    db_type: String,
}

impl DatabaseRow {
    fn into_descriptor(self) -> AppResult<DatabaseDescriptor> {
        let engine = DbEngine::parse(&self.db_type).ok_or_else(|| {
            AppError::Validation(format!("unsupported db_type '{}' for {}", self.db_type, self.name))
        })?;
        Ok(DatabaseDescriptor {
            name: self.name,
            engine,
            host: self.host,
            port: self
                .port
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or_else(|| engine.default_port()),
            user: self.username,
            password: self.password.unwrap_or_default(),
            dbname: self.dbname,
            cloudwatch_id: self.cloudwatch_id.filter(|id| !id.is_empty()),
        })
    }
}

/// Registry backed by the `databases` table of the application database.
pub struct SqlRegistry {
    pool: PgPool,
}

impl SqlRegistry {
    /// Connects to the application database.
    pub async fn connect(database_url: &str, config: &AppConfig) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs.max(1)))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseConnection(e.to_string()))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabaseRegistry for SqlRegistry {
    async fn list_databases(&self) -> AppResult<Vec<DatabaseDescriptor>> {
        let rows = sqlx::query_as::<_, DatabaseRow>(
            "SELECT name, host, port, username, password, dbname, cloudwatch_id, \
             COALESCE(db_type, 'postgres') AS db_type FROM databases ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseQuery(e.to_string()))?;

        let mut descriptors = Vec::with_capacity(rows.len());
        for row in rows {
            let name = row.name.clone();
            let descriptor = match row.into_descriptor() {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    tracing::warn!(db = %name, error = %e, "Skipping database registration");
                    continue;
                }
            };
            match descriptor.validate() {
                Ok(()) => descriptors.push(descriptor),
                Err(e) => tracing::warn!(db = %descriptor.name, error = %e, "Skipping invalid database registration"),
            }
        }
        Ok(descriptors)
    }
}

/// In-memory registry, replaceable at runtime.
#[derive(Default)]
pub struct StaticRegistry {
    databases: RwLock<Vec<DatabaseDescriptor>>,
}

impl StaticRegistry {
    pub fn new(databases: Vec<DatabaseDescriptor>) -> Self {
        Self {
            databases: RwLock::new(databases),
        }
    }

    pub async fn replace(&self, databases: Vec<DatabaseDescriptor>) {
        *self.databases.write().await = databases;
    }
}

#[async_trait]
impl DatabaseRegistry for StaticRegistry {
    async fn list_databases(&self) -> AppResult<Vec<DatabaseDescriptor>> {
        Ok(self.databases.read().await.clone())
    }
}
