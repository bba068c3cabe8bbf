use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error as ThisError;

use super::{BusError, IsFatal, StorageError};

#[derive(Debug, ThisError)]
pub enum SwapdbError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("record {0} not found")]
    NotFound(String),

    #[error("malformed swap message {payload:?}: {reason}")]
    MalformedMessage { payload: String, reason: String },

    #[error("replacing storage with {} failed: {source}", path.display())]
    ReplaceFailed {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("publishing swap request failed: {0}")]
    Publish(#[source] BusError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl SwapdbError {
    pub(crate) fn malformed(payload: &[u8], reason: impl ToString) -> Self {
        Self::MalformedMessage {
            payload: String::from_utf8_lossy(payload).into_owned(),
            reason: reason.to_string(),
        }
    }
}

impl IsFatal for SwapdbError {
    fn is_fatal(&self) -> bool {
        match self {
            SwapdbError::ReplaceFailed { .. } | SwapdbError::MalformedMessage { .. } => true,
            SwapdbError::Storage(StorageError::OpenExhausted { .. }) => true,
            SwapdbError::Storage(_)
            | SwapdbError::NotFound(_)
            | SwapdbError::Publish(_)
            | SwapdbError::JsonError(_) => false,
        }
    }
}

impl IntoResponse for SwapdbError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match self {
            SwapdbError::NotFound(key) => (
                StatusCode::NOT_FOUND,
                ApiErrorObject {
                    code: "NOT_FOUND".to_string(),
                    message: format!("No record for key {key}."),
                },
            ),

            SwapdbError::Publish(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiErrorObject {
                    code: "BUS_UNAVAILABLE".to_string(),
                    message: "Swap request could not be published; retry later.".to_string(),
                },
            ),

            SwapdbError::Storage(_)
            | SwapdbError::MalformedMessage { .. }
            | SwapdbError::ReplaceFailed { .. }
            | SwapdbError::JsonError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorObject {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                },
            ),
        };
        (status, Json(ApiErrorBody { inner: error_body })).into_response()
    }
}

/// Standardized API error response payload.
#[derive(Serialize)]
pub struct ApiErrorObject {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorBody {
    #[serde(rename = "error")]
    pub inner: ApiErrorObject,
}
