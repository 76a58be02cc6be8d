use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }
}

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn success_message(message: &str) -> ApiResponse<()> {
        ApiResponse {
            code: 0,
            message: message.to_string(),
            data: None,
        }
    }

    pub fn error(code: i32, message: &str) -> ApiResponse<()> {
        ApiResponse {
            code,
            message: message.to_string(),
            data: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, 404, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, 409, msg.clone()),
            AppError::NotADirectory(msg) => (
                StatusCode::BAD_REQUEST,
                400,
                format!("Not a directory: {}", msg),
            ),
            AppError::DirectoryNotEmpty(msg) => (
                StatusCode::CONFLICT,
                409,
                format!("Directory not empty: {}", msg),
            ),
            AppError::NotSupported(msg) => (
                StatusCode::FORBIDDEN,
                403,
                format!("Operation not supported: {}", msg),
            ),
            AppError::RemoteUnavailable(msg) => {
                tracing::error!("Remote error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    502,
                    "Backing service unavailable".to_string(),
                )
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, 500, "Store error".to_string())
            }
            AppError::Cancelled(msg) => {
                tracing::warn!("Cancelled: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    503,
                    "Operation cancelled".to_string(),
                )
            }
            AppError::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, 400, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, 401, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, 403, msg.clone()),
            AppError::Io(e) => {
                tracing::error!("IO error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, 500, "IO error".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    500,
                    "Internal error".to_string(),
                )
            }
        };

        let body = Json(ApiResponse::<()>::error(code, &message));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
