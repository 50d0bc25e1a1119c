use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use comments_shared::InvalidSortParameter;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("CAPTCHA verification failed")]
    GateFailure,

    #[error("Unsupported attachment type: {0}")]
    UnsupportedAttachment(String),

    #[error("Attachment exceeds the limit of {limit} bytes")]
    AttachmentTooLarge { limit: usize },

    #[error("Attachment processing failed: {0}")]
    AttachmentProcessing(String),

    #[error(transparent)]
    InvalidSortParameter(#[from] InvalidSortParameter),

    #[error("Comment not found")]
    NotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Thread is deeper than {0} levels")]
    DepthLimitExceeded(usize),

    #[error("Thread assembly timed out")]
    Timeout,

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::GateFailure
            | AppError::UnsupportedAttachment(_)
            | AppError::AttachmentTooLarge { .. }
            | AppError::InvalidSortParameter(_)
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::AttachmentProcessing(_)
            | AppError::DepthLimitExceeded(_)
            | AppError::Timeout
            | AppError::Store(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Io(e) => {
                tracing::error!("I/O error: {:?}", e);
                "Internal error".to_string()
            }
            AppError::AttachmentProcessing(e) => {
                tracing::warn!("Attachment processing failed: {}", e);
                "Image resizing failed".to_string()
            }
            AppError::DepthLimitExceeded(_) | AppError::Timeout => {
                tracing::error!("Thread assembly aborted: {}", self);
                self.to_string()
            }
            AppError::Validation(msg) => msg.clone(),
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_4xx() {
        assert_eq!(AppError::GateFailure.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::AttachmentTooLarge { limit: 1 }.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(InvalidSortParameter("sortBy=text".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn store_and_processing_errors_are_5xx() {
        assert_eq!(
            AppError::Store(sqlx::Error::PoolTimedOut).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::AttachmentProcessing("bad png".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(AppError::Timeout.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
