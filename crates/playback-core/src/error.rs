use crate::response::ErrorResponse;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database not available")]
    ServiceUnavailable,

    #[error("{extension} extension not available")]
    ExtensionUnavailable { extension: String },

    /// The query function failed. `source` carries the backend detail and is
    /// only ever written to logs.
    #[error("Failed to execute query: {prefix}")]
    QueryFailed {
        prefix: String,
        #[source]
        source: anyhow::Error,
    },
}

impl QueryError {
    pub fn validation(message: impl Into<String>) -> Self {
        QueryError::Validation(message.into())
    }

    pub fn extension_unavailable(extension: impl Into<String>) -> Self {
        QueryError::ExtensionUnavailable {
            extension: extension.into(),
        }
    }

    pub fn query_failed(prefix: impl Into<String>, source: anyhow::Error) -> Self {
        QueryError::QueryFailed {
            prefix: prefix.into(),
            source,
        }
    }

    /// Machine readable error code placed in the response envelope
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::Validation(_) => "VALIDATION_ERROR",
            QueryError::ServiceUnavailable => "SERVICE_ERROR",
            QueryError::ExtensionUnavailable { .. } => "EXTENSION_UNAVAILABLE",
            QueryError::QueryFailed { .. } => "DATABASE_ERROR",
        }
    }

    /// HTTP status the caller should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            QueryError::Validation(_) => 400,
            QueryError::ServiceUnavailable | QueryError::ExtensionUnavailable { .. } => 503,
            QueryError::QueryFailed { .. } => 500,
        }
    }

    /// Whether this error was raised before any cache or backend work
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            QueryError::ServiceUnavailable | QueryError::ExtensionUnavailable { .. }
        )
    }

    /// Build the client-facing envelope. Only the `Display` text is used, so
    /// the wrapped backend error never leaves the process.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(self.code(), self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
