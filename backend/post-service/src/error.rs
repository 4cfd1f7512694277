/// Error types for Post Service
///
/// Every failure a handler can report is an [`AppError`]. Errors render as
/// `{ "error": <message>, "status": <code> }`; infrastructure detail is logged
/// where it happens and only the variant message reaches the client.
use crate::domain::validation::ValidationError;
use crate::repository::StoreError;
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

/// Result type for post-service operations
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// Rejected before any state was touched
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store unavailable")]
    StoreUnavailable,

    #[error("Transaction aborted")]
    TransactionAborted,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn post_not_found() -> Self {
        AppError::NotFound("post".to_string())
    }

    pub fn comment_not_found() -> Self {
        AppError::NotFound("comment".to_string())
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::StoreUnavailable => "store_unavailable",
            AppError::TransactionAborted => "transaction_aborted",
            AppError::Internal(_) => "internal",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StoreUnavailable | AppError::TransactionAborted | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        HttpResponse::build(status).json(serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(detail) => {
                tracing::error!(error = %detail, "aggregate store unavailable");
                AppError::StoreUnavailable
            }
            StoreError::TransactionAborted(detail) => {
                tracing::warn!(error = %detail, "transaction aborted");
                AppError::TransactionAborted
            }
            StoreError::Corrupt(detail) => {
                tracing::error!(error = %detail, "corrupt record in aggregate store");
                AppError::Internal("corrupt record".to_string())
            }
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

impl From<media_store::MediaError> for AppError {
    fn from(err: media_store::MediaError) -> Self {
        match err {
            media_store::MediaError::TooLarge { .. } => AppError::InvalidInput(err.to_string()),
            other => {
                tracing::error!(error = %other, "media store failure");
                AppError::Internal("media upload failed".to_string())
            }
        }
    }
}

impl From<actix_multipart::MultipartError> for AppError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        AppError::InvalidInput(format!("malformed multipart body: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::InvalidInput("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::post_not_found().status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::StoreUnavailable.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::TransactionAborted.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_errors_hide_detail() {
        let err: AppError = StoreError::Unavailable("connection refused to 10.0.0.3".into()).into();
        assert!(matches!(err, AppError::StoreUnavailable));
        assert!(!err.to_string().contains("10.0.0.3"));
    }

    #[test]
    fn test_validation_maps_to_invalid_input() {
        let err: AppError = ValidationError::Empty("comment").into();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
