//! JSON response envelopes returned by cached query handlers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Timing and cache metadata attached to every successful response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub timestamp: DateTime<Utc>,
    /// Wall-clock time of the query function in milliseconds, 0 when cached
    pub query_time_ms: u64,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: Status,
    pub data: T,
    pub metadata: Metadata,
}

impl<T> ApiResponse<T> {
    /// Response served from the cache
    pub fn cached(data: T) -> Self {
        Self {
            status: Status::Success,
            data,
            metadata: Metadata {
                timestamp: Utc::now(),
                query_time_ms: 0,
                cached: true,
            },
        }
    }

    /// Response computed by the query function
    pub fn computed(data: T, query_time_ms: u64) -> Self {
        Self {
            status: Status::Success,
            data,
            metadata: Metadata {
                timestamp: Utc::now(),
                query_time_ms,
                cached: false,
            },
        }
    }

    pub fn is_cached(&self) -> bool {
        self.metadata.cached
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: Status,
    pub error: ErrorDetail,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
            timestamp: Utc::now(),
        }
    }
}
