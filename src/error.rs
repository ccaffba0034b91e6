use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::storage::StorageError;

/// Which direction of the dual index a write was attempting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteStage {
    /// `key -> value`; failure here means nothing was written
    Forward,
    /// `value -> key`; failure here leaves the forward mapping in place
    Reverse,
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteStage::Forward => f.write_str("forward"),
            WriteStage::Reverse => f.write_str("reverse"),
        }
    }
}

#[derive(Debug, Error)]
#[error("{stage} write failed: {source}")]
pub struct StoreError {
    pub stage: WriteStage,
    #[source]
    pub source: StorageError,
}

impl StoreError {
    pub fn forward(source: StorageError) -> Self {
        Self {
            stage: WriteStage::Forward,
            source,
        }
    }

    pub fn reverse(source: StorageError) -> Self {
        Self {
            stage: WriteStage::Reverse,
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Fatal errors raised while starting or running the server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("unable to open storage: {0}")]
    Storage(#[from] StorageError),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced to HTTP clients
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unable to decode request body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("internal server error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Decode(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::BAD_REQUEST,
            ApiError::Fetch(FetchError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Fetch(FetchError::Storage(_)) => StatusCode::BAD_REQUEST,
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            ApiError::Decode(_) => "unable to decode store request",
            ApiError::Store(err) => match err.stage {
                WriteStage::Forward => "unable to store key-value pair",
                WriteStage::Reverse => "key-value pair stored without reverse mapping",
            },
            ApiError::Fetch(FetchError::NotFound(_)) => "key not found",
            ApiError::Fetch(FetchError::Storage(_)) => "unable to fetch key value",
            ApiError::RateLimitExceeded => "rate limit exceeded",
            ApiError::Internal(_) => "internal server error",
        }
    }
}

/// JSON envelope returned for every failed request
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<WriteStage>,
}

impl ErrorResponse {
    pub fn from_api_error(err: &ApiError) -> Self {
        let stage = match err {
            ApiError::Store(store) => Some(store.stage),
            _ => None,
        };
        Self {
            message: err.message().to_string(),
            error: err.to_string(),
            stage,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Store(StoreError {
                stage: WriteStage::Reverse,
                ..
            }) => tracing::error!(error = %self, "Partial write: forward mapping persisted without reverse"),
            ApiError::Internal(_) => tracing::error!(error = %self, "Request failed"),
            ApiError::RateLimitExceeded => {}
            _ => tracing::warn!(error = %self, "{}", self.message()),
        }
        (status, Json(ErrorResponse::from_api_error(&self))).into_response()
    }
}
