//! SQL execution against monitored databases.
//!
//! [`PoolExecutor`] keeps one small connection pool per monitored database
//! and decodes result rows into JSON values so that collectors can read them
//! without knowing the engine's wire types.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::database::{DatabaseDescriptor, DbEngine};
use common::models::query::QueryOutput;
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Column, MySqlPool, PgPool, Row};
use tokio::sync::RwLock;

/// Runs a fixed SQL string against a database.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Executes `sql` and returns column names and rows.
    ///
    /// # Errors
    /// `AppError::DatabaseConnection` / `AppError::Timeout` when the database
    /// cannot be reached, `AppError::DatabaseQuery` when the statement fails
    /// or runs past the time limit.
    async fn execute(&self, descriptor: &DatabaseDescriptor, sql: &str) -> AppResult<QueryOutput>;

    /// Drops any cached connection for `name`.
    async fn release(&self, _name: &str) {}
}

/// Connection pool wrapper for the supported engines.
#[derive(Clone)]
enum DatabasePool {
    MySQL(MySqlPool),
    Postgres(PgPool),
}

struct CachedPool {
    descriptor: DatabaseDescriptor,
    pool: DatabasePool,
}

/// Pool-backed [`SqlExecutor`].
///
/// Pools are created on first use and rebuilt when the descriptor of a name
/// changes.
pub struct PoolExecutor {
    connect_timeout: Duration,
    max_connections: u32,
    pools: RwLock<HashMap<String, CachedPool>>,
}

impl PoolExecutor {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs.max(1)),
            max_connections: config.max_connections.max(1),
            pools: RwLock::new(HashMap::new()),
        }
    }

    async fn pool_for(&self, descriptor: &DatabaseDescriptor) -> AppResult<DatabasePool> {
        {
            let pools = self.pools.read().await;
            if let Some(cached) = pools.get(&descriptor.name) {
                if cached.descriptor == *descriptor {
                    return Ok(cached.pool.clone());
                }
            }
        }

        let pool = self.create_pool(descriptor).await?;
        let mut pools = self.pools.write().await;
        if let Some(stale) = pools.insert(
            descriptor.name.clone(),
            CachedPool {
                descriptor: descriptor.clone(),
                pool: pool.clone(),
            },
        ) {
            close_pool(stale.pool).await;
        }
        tracing::debug!(db = %descriptor.name, engine = %descriptor.engine, "Connection pool created");
        Ok(pool)
    }

    async fn create_pool(&self, descriptor: &DatabaseDescriptor) -> AppResult<DatabasePool> {
        match descriptor.engine {
            DbEngine::Postgres => {
                let options = PgConnectOptions::new()
                    .host(&descriptor.host)
                    .port(descriptor.port)
                    .username(&descriptor.user)
                    .password(&descriptor.password)
                    .database(&descriptor.dbname);
                let pool = PgPoolOptions::new()
                    .max_connections(self.max_connections)
                    .acquire_timeout(self.connect_timeout)
                    .connect_with(options)
                    .await
                    .map_err(|e| AppError::DatabaseConnection(e.to_string()))?;
                Ok(DatabasePool::Postgres(pool))
            }
            DbEngine::MySQL => {
                let options = MySqlConnectOptions::new()
                    .host(&descriptor.host)
                    .port(descriptor.port)
                    .username(&descriptor.user)
                    .password(&descriptor.password)
                    .database(&descriptor.dbname);
                let pool = MySqlPoolOptions::new()
                    .max_connections(self.max_connections)
                    .acquire_timeout(self.connect_timeout)
                    .connect_with(options)
                    .await
                    .map_err(|e| AppError::DatabaseConnection(e.to_string()))?;
                Ok(DatabasePool::MySQL(pool))
            }
        }
    }
}

#[async_trait]
impl SqlExecutor for PoolExecutor {
    async fn execute(&self, descriptor: &DatabaseDescriptor, sql: &str) -> AppResult<QueryOutput> {
        let pool = tokio::time::timeout(self.connect_timeout, self.pool_for(descriptor))
            .await
            .map_err(|_| AppError::Timeout(self.connect_timeout.as_secs()))??;

        let fetch = async {
            match &pool {
                DatabasePool::Postgres(p) => sqlx::query(sql)
                    .fetch_all(p)
                    .await
                    .map(|rows| decode_rows(&rows, pg_value)),
                DatabasePool::MySQL(p) => sqlx::query(sql)
                    .fetch_all(p)
                    .await
                    .map(|rows| decode_rows(&rows, mysql_value)),
            }
        };

        tokio::time::timeout(self.connect_timeout, fetch)
            .await
            .map_err(|_| statement_timed_out(self.connect_timeout))?
            .map_err(|e| match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                    AppError::DatabaseConnection(e.to_string())
                }
                other => AppError::DatabaseQuery(other.to_string()),
            })
    }

    async fn release(&self, name: &str) {
        let removed = self.pools.write().await.remove(name);
        if let Some(cached) = removed {
            close_pool(cached.pool).await;
            tracing::debug!(db = %name, "Connection pool closed");
        }
    }
}

/// A statement that outlives its time limit fails like any other statement;
/// the connection itself was reachable.
pub(crate) fn statement_timed_out(limit: Duration) -> AppError {
    AppError::DatabaseQuery(format!("statement timed out after {}s", limit.as_secs()))
}

async fn close_pool(pool: DatabasePool) {
    match pool {
        DatabasePool::Postgres(p) => p.close().await,
        DatabasePool::MySQL(p) => p.close().await,
    }
}

fn decode_rows<R: Row>(rows: &[R], value_at: fn(&R, usize) -> Value) -> QueryOutput {
    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|i| value_at(row, i)).collect())
        .collect();
    QueryOutput::new(columns, rows)
}

// Diagnostic statements cast their results to integers, floats or text, so
// trying the common types in order is enough.
fn pg_value(row: &PgRow, i: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(i) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(i) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    Value::Null
}

fn mysql_value(row: &MySqlRow, i: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(i) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(i) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    // SHOW statements may report text columns as binary.
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(i) {
        return v
            .map(|bytes| Value::from(String::from_utf8_lossy(&bytes).into_owned()))
            .unwrap_or(Value::Null);
    }
    Value::Null
}
