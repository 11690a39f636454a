use crate::services::fetcher::FetchError;
use crate::services::importer::ImportError;
use crate::services::sideloader::SideloadError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Sideload(#[from] SideloadError),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl AppError {
    fn sideload_status(e: &SideloadError) -> StatusCode {
        match e {
            SideloadError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            SideloadError::Fetch(FetchError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            SideloadError::Fetch(FetchError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            SideloadError::Fetch(FetchError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            SideloadError::Fetch(_) => StatusCode::BAD_GATEWAY,
            SideloadError::Import(ImportError::FileTypeNotAllowed(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            SideloadError::Import(ImportError::InvalidFile(_)) => StatusCode::BAD_REQUEST,
            SideloadError::Import(ImportError::TooLarge(_)) => StatusCode::PAYLOAD_TOO_LARGE,
            SideloadError::Import(ImportError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Sideload(e) => {
                let status = Self::sideload_status(&e);
                if status.is_server_error() {
                    tracing::error!("Sideload failed: {}", e);
                }
                let mut body = json!({
                    "error": e.to_string(),
                    "code": e.code(),
                });
                if let Some(upstream) = e.status() {
                    body["status"] = json!(upstream);
                }
                return (status, Json(body)).into_response();
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}
