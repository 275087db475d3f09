use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;

pub type AppResult<T> = Result<T, AppError>;

/// Failures of the record and attachment lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum OficioError {
    #[error("oficio {0} not found")]
    NotFound(i32),

    #[error("upload {filename:?} rejected: {reason}")]
    UploadRejected { filename: String, reason: String },

    #[error("attachment storage unavailable: {0:#}")]
    StorageUnavailable(#[source] anyhow::Error),

    #[error("attachment {0:?} not found")]
    AttachmentNotFound(String),

    #[error(transparent)]
    Database(#[from] diesel::result::Error),
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "resource not found")
    }

    pub fn internal<E: Display>(error: E) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<OficioError> for AppError {
    fn from(value: OficioError) -> Self {
        match value {
            OficioError::NotFound(_) => {
                AppError::new(StatusCode::NOT_FOUND, "Oficio no encontrado")
            }
            OficioError::AttachmentNotFound(_) => AppError::not_found(),
            OficioError::UploadRejected { .. } => AppError::bad_request(value.to_string()),
            OficioError::StorageUnavailable(_) => {
                AppError::new(StatusCode::SERVICE_UNAVAILABLE, value.to_string())
            }
            OficioError::Database(err) => AppError::from(err),
        }
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(value: diesel::result::Error) -> Self {
        match value {
            diesel::result::Error::NotFound => AppError::not_found(),
            _ => AppError::internal(value),
        }
    }
}
