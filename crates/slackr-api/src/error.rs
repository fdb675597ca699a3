use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use slackr_db::StoreError;
use slackr_types::api::ErrorBody;

/// Failure of a slackr operation.
///
/// `InvalidInput` and `Unauthorized` carry the message shown to the client.
/// Everything else is a server fault and the client only sees a generic
/// message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (name, message) = match &self {
            ApiError::InvalidInput(message) => ("ValueError", message.clone()),
            ApiError::Unauthorized(message) => ("AccessError", message.clone()),
            ApiError::Store(_) | ApiError::Internal(_) => {
                error!("Request failed: {}", self);
                ("System Error", "Internal server error".to_string())
            }
        };

        let body = ErrorBody {
            code: status.as_u16(),
            name: name.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(err: ApiError) -> (StatusCode, ErrorBody) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_invalid_input_is_value_error() {
        let (status, body) = body_of(ApiError::invalid("Email is not valid.")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, 400);
        assert_eq!(body.name, "ValueError");
        assert_eq!(body.message, "Email is not valid.");
    }

    #[tokio::test]
    async fn test_store_error_hides_details() {
        let err = ApiError::from(StoreError::NotFound {
            collection: "users".into(),
            key: 4,
        });
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.name, "System Error");
        assert!(!body.message.contains("users"));
    }
}
