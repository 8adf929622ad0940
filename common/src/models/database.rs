//! Monitored database descriptors.
//!
//! Descriptors are owned by an external registry; the services only read them.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Database engine enumeration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DbEngine {
    /// PostgreSQL (also RDS/Aurora PostgreSQL).
    #[default]
    Postgres,
    /// MySQL (also RDS/Aurora MySQL).
    MySQL,
}

impl DbEngine {
    /// Returns the default port for this engine.
    pub fn default_port(&self) -> u16 {
        match self {
            DbEngine::Postgres => 5432,
            DbEngine::MySQL => 3306,
        }
    }

    /// Parses an engine name as stored by the registry.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "aurora-postgresql" => Some(DbEngine::Postgres),
            "mysql" | "mariadb" | "aurora-mysql" => Some(DbEngine::MySQL),
            _ => None,
        }
    }
}

impl std::fmt::Display for DbEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbEngine::Postgres => write!(f, "postgres"),
            DbEngine::MySQL => write!(f, "mysql"),
        }
    }
}

/// Connection and identification record of a registered database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DatabaseDescriptor {
    /// Unique registry key.
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,
    /// Database engine.
    #[serde(default)]
    pub engine: DbEngine,
    /// Database host.
    #[validate(length(min = 1, message = "Host is required"))]
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Login user.
    pub user: String,
    /// Login password (not serialized in responses).
    #[serde(skip_serializing, default)]
    pub password: String,
    /// Target database / schema.
    pub dbname: String,
    /// AWS RDS instance or cluster identifier used for CloudWatch lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloudwatch_id: Option<String>,
}

impl DatabaseDescriptor {
    /// Creates a PostgreSQL descriptor on the default port.
    pub fn postgres(
        name: impl Into<String>,
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        dbname: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            engine: DbEngine::Postgres,
            host: host.into(),
            port: DbEngine::Postgres.default_port(),
            user: user.into(),
            password: password.into(),
            dbname: dbname.into(),
            cloudwatch_id: None,
        }
    }

    /// Sets the engine and switches to its default port.
    pub fn with_engine(mut self, engine: DbEngine) -> Self {
        self.engine = engine;
        self.port = engine.default_port();
        self
    }

    /// Sets the CloudWatch identifier.
    pub fn with_cloudwatch_id(mut self, id: impl Into<String>) -> Self {
        self.cloudwatch_id = Some(id.into());
        self
    }
}
