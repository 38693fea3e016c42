//! HTTP-facing error type

use crate::ingestion::download::DownloadError;
use crate::ingestion::fetch::FetchError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub const INTERNAL_ERROR_MESSAGE: &str = "An internal server error occurred.";
pub const UPSTREAM_ERROR_MESSAGE: &str = "The upstream data service could not be reached.";

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("{0}")]
    BadRequest(String),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] FetchError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Download(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Only validation messages reach the caller verbatim
        let message = match &self {
            AppError::Download(_) | AppError::BadRequest(_) => self.to_string(),
            AppError::Upstream(e) => {
                error!("Upstream error: {}", e);
                UPSTREAM_ERROR_MESSAGE.to_string()
            }
            AppError::Internal(e) => {
                error!("Internal error: {:#}", e);
                INTERNAL_ERROR_MESSAGE.to_string()
            }
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}
