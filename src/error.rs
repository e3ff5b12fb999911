//! Error taxonomy shared by every component, rendered with the response envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::response::ApiResponse;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    /// The reason is logged, never returned to the caller.
    #[error("authentication failed: {0}")]
    Authentication(&'static str),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("store error: {0}")]
    Store(String),

    /// The call may still have been applied; callers must not assume it was not.
    #[error("store call timed out")]
    StoreTimeout,

    #[error("signing error: {0}")]
    Signing(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Upload(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(_) | AppError::StoreTimeout => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Signing(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Validation(msg) | AppError::Conflict(msg) | AppError::NotFound(msg) => {
                msg.clone()
            }
            AppError::Authentication(reason) => {
                tracing::warn!(%reason, "request rejected");
                "Unauthorized request".to_string()
            }
            AppError::Upload(msg) => {
                tracing::error!(error = %msg, "upload error");
                "Failed to store image".to_string()
            }
            AppError::Store(msg) => {
                tracing::error!(error = %msg, "store error");
                "Storage backend unavailable".to_string()
            }
            AppError::StoreTimeout => {
                tracing::error!("store call timed out");
                "Storage backend unavailable".to_string()
            }
            AppError::Signing(msg) | AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                "Internal server error".to_string()
            }
        };

        ApiResponse::new(status, serde_json::Value::Null, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(AppError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Authentication("x").status(), StatusCode::UNAUTHORIZED);
        assert!(AppError::Upload("x".into()).status().is_server_error());
        assert!(AppError::Store("x".into()).status().is_server_error());
        assert_eq!(AppError::StoreTimeout.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(AppError::Signing("x".into()).status().is_server_error());
    }

    #[tokio::test]
    async fn authentication_body_is_generic() {
        let res = AppError::Authentication("refresh token reused").into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let bytes = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(body.contains("Unauthorized request"));
        assert!(!body.contains("reused"));
    }

    #[tokio::test]
    async fn store_error_hides_detail() {
        let res = AppError::Store("connection refused on 10.0.0.3".into()).into_response();
        let bytes = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!body.contains("10.0.0.3"));
    }
}
