use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Operation not permitted: {}", reasons.join("; "))]
    PermissionDenied { reasons: Vec<String> },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("DDL execution failed after {} statement(s): {cause}", executed.len())]
    Execution { executed: Vec<String>, cause: String },

    #[error("Catalog introspection failed for {target}: {cause}")]
    IntrospectionFailed { target: String, cause: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: String },

    #[error("Connection failed: {cause}")]
    ConnectionFailed { cause: String },

    #[error("Query failed ({context}): {cause}")]
    QueryFailed { context: String, cause: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &str, key: impl ToString) -> Self {
        EngineError::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    pub fn query(context: &str, err: tokio_postgres::Error) -> Self {
        EngineError::QueryFailed {
            context: context.to_string(),
            cause: describe_pg_error(&err),
        }
    }

    /// Stable machine-readable code for callers that surface errors as data
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "validation_error",
            EngineError::PermissionDenied { .. } => "permission_denied",
            EngineError::Conflict { .. } => "conflict",
            EngineError::Execution { .. } => "execution_failed",
            EngineError::IntrospectionFailed { .. } => "introspection_failed",
            EngineError::NotFound { .. } => "not_found",
            EngineError::ConnectionFailed { .. } => "connection_failed",
            EngineError::QueryFailed { .. } => "query_failed",
            EngineError::Internal(_) => "internal_error",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        let (reasons, executed) = match self {
            EngineError::PermissionDenied { reasons } => (Some(reasons.clone()), None),
            EngineError::Execution { executed, .. } => (None, Some(executed.clone())),
            _ => (None, None),
        };

        ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
            reasons,
            executed_statements: executed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasons: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_statements: Option<Vec<String>>,
}

/// The server's message, detail and SQLSTATE. The error's own Display only
/// says "db error" for server-side failures.
pub fn describe_pg_error(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db_err) => {
            let mut message = format!("{} [{}]", db_err.message(), db_err.code().code());
            if let Some(detail) = db_err.detail() {
                message.push_str(" - ");
                message.push_str(detail);
            }
            message
        }
        None => err.to_string(),
    }
}

impl From<tokio_postgres::Error> for EngineError {
    fn from(err: tokio_postgres::Error) -> Self {
        EngineError::query("postgres", err)
    }
}

impl From<deadpool_postgres::PoolError> for EngineError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        EngineError::ConnectionFailed {
            cause: format!("Pool error: {}", err),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Internal(format!("JSON error: {}", err))
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_joins_reasons() {
        let err = EngineError::PermissionDenied {
            reasons: vec![
                "System collections cannot be deleted".to_string(),
                "Code 'select' is a reserved word".to_string(),
            ],
        };

        let message = err.to_string();
        assert!(message.contains("System collections cannot be deleted"));
        assert!(message.contains("; Code 'select' is a reserved word"));
        assert_eq!(err.code(), "permission_denied");
    }

    #[test]
    fn test_execution_error_keeps_partial_statements() {
        let err = EngineError::Execution {
            executed: vec!["ALTER TABLE \"orders\" ADD COLUMN \"total\" NUMERIC(19,4)".to_string()],
            cause: "column \"total\" already exists".to_string(),
        };

        assert!(err.to_string().contains("after 1 statement(s)"));
        let response = err.to_response();
        assert_eq!(response.error, "execution_failed");
        assert_eq!(response.executed_statements.map(|s| s.len()), Some(1));
        assert!(response.reasons.is_none());
    }
}
