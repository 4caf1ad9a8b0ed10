use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use detour_core::{CoreError, ProviderError, StorageError};
use detour_matcher::MatcherError;
use detour_sync::SyncError;
use thiserror::Error;
use tracing::{error, warn};

use crate::model::ErrorResponse;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Invalid(#[from] CoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Matcher(#[from] MatcherError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("propagation job failed: {0}")]
    Job(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Invalid(_) => StatusCode::BAD_REQUEST,
            AppError::Storage(err) => storage_status(err),
            AppError::Matcher(MatcherError::Storage(err)) => storage_status(err),
            AppError::Matcher(MatcherError::Cache(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Sync(err) => match err {
                SyncError::VanityConflict { .. } => StatusCode::CONFLICT,
                SyncError::Core(_) => StatusCode::BAD_REQUEST,
                SyncError::Storage(err) => storage_status(err),
                SyncError::Provider(ProviderError::NotFound(_)) => StatusCode::NOT_FOUND,
                SyncError::Provider(ProviderError::Transient(_)) => StatusCode::SERVICE_UNAVAILABLE,
                SyncError::Provider(ProviderError::Failed(_))
                | SyncError::DepthExceeded { .. }
                | SyncError::Cycle { .. }
                | SyncError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Job(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self.status() {
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::BAD_REQUEST => "invalid_request",
            StatusCode::CONFLICT => "conflict",
            StatusCode::SERVICE_UNAVAILABLE => "unavailable",
            _ => "internal",
        }
    }
}

fn storage_status(err: &StorageError) -> StatusCode {
    match err {
        StorageError::Conflict { .. } | StorageError::DuplicateId(_) => StatusCode::CONFLICT,
        StorageError::InvalidData(_) => StatusCode::BAD_REQUEST,
        err if err.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
