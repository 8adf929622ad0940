//! Environment-driven configuration.
//!
//! Every value has a default so a service can start with an empty
//! environment; malformed values are logged and replaced by the default.

use std::str::FromStr;

/// Runtime configuration shared by the services.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Name of the service that loaded this configuration.
    pub service_name: String,
    /// Connection string of the application database holding the registry.
    pub database_url: Option<String>,
    /// Connect/acquire timeout for monitored databases.
    pub connect_timeout_secs: u64,
    /// Pool size per monitored database.
    pub max_connections: u32,
    /// Base interval of the metrics scheduler.
    pub monitor_interval_secs: u64,
    /// Upper bound for a single collection call.
    pub collect_timeout_secs: u64,
    /// Location of the playbook definitions.
    pub playbook_path: String,
    /// Sleep between two playbook evaluation cycles.
    pub playbook_interval_secs: u64,
    /// Default look-back window for slow-query analysis.
    pub slow_query_hours: u32,
    /// Emit JSON formatted logs instead of plain text.
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "monitor".to_string(),
            database_url: None,
            connect_timeout_secs: 5,
            max_connections: 2,
            monitor_interval_secs: 60,
            collect_timeout_secs: 10,
            playbook_path: "playbooks.json".to_string(),
            playbook_interval_secs: 60,
            slow_query_hours: 24,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Loads the configuration from the process environment.
    pub fn load_with_service(service_name: &str) -> Self {
        let defaults = Self::default();
        Self {
            service_name: service_name.to_string(),
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs),
            max_connections: env_or("DB_MAX_CONNECTIONS", defaults.max_connections),
            monitor_interval_secs: env_or("MONITOR_INTERVAL_SECS", defaults.monitor_interval_secs),
            collect_timeout_secs: env_or("COLLECT_TIMEOUT_SECS", defaults.collect_timeout_secs),
            playbook_path: std::env::var("PLAYBOOK_PATH").unwrap_or(defaults.playbook_path),
            playbook_interval_secs: env_or(
                "PLAYBOOK_INTERVAL_SECS",
                defaults.playbook_interval_secs,
            ),
            slow_query_hours: env_or("SLOW_QUERY_HOURS", defaults.slow_query_hours),
            json_logs: std::env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}

fn env_or<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, default = %default, "Invalid config value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Load .env file from the working directory (best-effort, no error if missing).
pub fn load_dotenv() {
    let env_path = std::path::Path::new(".env");
    if let Ok(content) = std::fs::read_to_string(env_path) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                // Only set if not already set by the environment
                if std::env::var(key).is_err() {
                    std::env::set_var(key, value.trim());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.monitor_interval_secs, 60);
        assert_eq!(config.playbook_interval_secs, 60);
        assert_eq!(config.playbook_path, "playbooks.json");
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_invalid_env_value_falls_back() {
        std::env::set_var("DBMON_TEST_BAD_NUMBER", "sixty");
        assert_eq!(env_or("DBMON_TEST_BAD_NUMBER", 60u64), 60);
        std::env::set_var("DBMON_TEST_GOOD_NUMBER", " 15 ");
        assert_eq!(env_or("DBMON_TEST_GOOD_NUMBER", 60u64), 15);
    }
}
