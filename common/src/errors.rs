//! Application error type.
//!
//! All fallible operations in the workspace return [`AppResult`].

use thiserror::Error;

/// Errors raised by collectors, collaborators and analyzers.
#[derive(Debug, Error)]
pub enum AppError {
    /// Could not open a connection (or acquire one from a pool).
    #[error("database connection failed: {0}")]
    DatabaseConnection(String),

    /// A diagnostic or registry query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(String),

    /// An operation exceeded its time budget.
    #[error("operation timed out after {0}s")]
    Timeout(u64),

    /// Input failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The remote telemetry backend cannot serve the request.
    #[error("remote telemetry unavailable: {0}")]
    TelemetryUnavailable(String),

    /// A call to the remote log service failed.
    #[error("log source error: {0}")]
    LogSource(String),

    /// The identifier resolved to zero log groups.
    #[error("no log groups found for identifier: {0}")]
    LogGroupsNotFound(String),

    /// The playbook definition source could not be parsed.
    #[error("invalid playbook configuration: {0}")]
    PlaybookConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Whether the failure is expected to clear on its own (network, timeouts,
    /// missing extensions) rather than indicating broken input.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::DatabaseConnection(_)
                | AppError::DatabaseQuery(_)
                | AppError::Timeout(_)
                | AppError::TelemetryUnavailable(_)
                | AppError::LogSource(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AppError::Timeout(5).is_transient());
        assert!(AppError::DatabaseQuery("relation missing".into()).is_transient());
        assert!(!AppError::LogGroupsNotFound("prod-db".into()).is_transient());
        assert!(!AppError::PlaybookConfig("bad json".into()).is_transient());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = AppError::LogGroupsNotFound("orders-db".into());
        assert!(err.to_string().contains("orders-db"));
    }
}
