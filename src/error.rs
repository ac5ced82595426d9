//! Error types for the agent allocator.

use serde::Serialize;

use crate::allocator::WorkItemId;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[cfg(feature = "postgres")]
    #[error("Pool runtime error: {0}")]
    PoolRuntime(#[from] deadpool_postgres::PoolError),

    #[cfg(feature = "libsql")]
    #[error("LibSQL error: {0}")]
    LibSql(#[from] libsql::Error),
}

/// Failure of a single work item assignment.
///
/// Every variant is fatal for the attempt that produced it. The transaction
/// has already been rolled back by the time the caller sees one of these.
#[derive(Debug, thiserror::Error)]
pub enum AssignError {
    #[error("Work item {work_item_id} not found")]
    NotFound { work_item_id: WorkItemId },

    #[error("No available agents for work item {work_item_id} after {attempts} attempts")]
    NoAgentAvailable {
        work_item_id: WorkItemId,
        attempts: u32,
    },

    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),
}

/// Stable, machine-readable classification of an [`AssignError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    NoAgentAvailable,
    StoreError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::NoAgentAvailable => "no_agent_available",
            Self::StoreError => "store_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AssignError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::NoAgentAvailable { .. } => ErrorKind::NoAgentAvailable,
            Self::Store(_) => ErrorKind::StoreError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::MissingRequired {
            key: "DATABASE_URL".to_string(),
            hint: "Set DATABASE_URL".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("DATABASE_URL"), "Should mention the key: {msg}");
        assert!(msg.contains("Set DATABASE_URL"), "Should include the hint: {msg}");

        let err = ConfigError::InvalidValue {
            key: "AGENT_WAIT_SECONDS".to_string(),
            message: "must be a number".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("AGENT_WAIT_SECONDS"), "Should mention the key: {msg}");
    }

    #[test]
    fn database_error_display() {
        let err = DatabaseError::Serialization("invalid uuid 'x'".to_string());
        assert!(err.to_string().contains("invalid uuid"));

        let err = DatabaseError::Transaction("transaction already finished".to_string());
        assert!(err.to_string().starts_with("Transaction error"));
    }

    #[test]
    fn assign_error_kinds() {
        let err = AssignError::NotFound {
            work_item_id: WorkItemId::from("P732687"),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("P732687"));

        let err = AssignError::NoAgentAvailable {
            work_item_id: WorkItemId::from("190011"),
            attempts: 3,
        };
        assert_eq!(err.kind(), ErrorKind::NoAgentAvailable);
        assert!(err.to_string().contains("after 3 attempts"));

        let err: AssignError = DatabaseError::Constraint("duplicate key".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::StoreError);
    }

    #[test]
    fn error_kind_wire_names() {
        assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
        assert_eq!(
            serde_json::to_string(&ErrorKind::NoAgentAvailable).unwrap(),
            "\"no_agent_available\""
        );
        assert_eq!(ErrorKind::StoreError.as_str(), "store_error");
    }
}
