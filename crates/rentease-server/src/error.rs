use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use rentease_shared::constants::HARD_MESSAGE_LIMIT;
use rentease_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Validation(String),

    #[error(
        "Message too large ({}MB). Maximum is {}MB.",
        fmt_mib(.size),
        .max / (1024 * 1024)
    )]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Request body too large. Maximum is {}MB.", .max / (1024 * 1024))]
    BodyTooLarge { max: usize },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Join with a user id before sending events")]
    NotJoined,

    #[error("Missing caller identity")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Too many requests")]
    RateLimited,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn fmt_mib(bytes: &usize) -> String {
    format!("{:.1}", *bytes as f64 / (1024.0 * 1024.0))
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServerError::NotFound("Message".into()),
            StoreError::Validation(msg) => ServerError::Validation(msg),
            other => ServerError::Storage(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::BodyTooLarge {
                max: HARD_MESSAGE_LIMIT,
            }
        } else {
            ServerError::Validation(rejection.body_text())
        }
    }
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Validation(_) => StatusCode::BAD_REQUEST,
            ServerError::PayloadTooLarge { .. } | ServerError::BodyTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::NotJoined | ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ServerError::Storage(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text shown to clients. Storage and internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ServerError::Storage(_) => "Storage unavailable".to_string(),
            ServerError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if self.status().is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = serde_json::json!({
            "success": false,
            "message": self.public_message(),
        });

        (self.status(), axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_too_large_message() {
        let err = ServerError::PayloadTooLarge {
            size: 16 * 1024 * 1024 - 100,
            max: 15 * 1024 * 1024,
        };
        assert_eq!(
            err.to_string(),
            "Message too large (16.0MB). Maximum is 15MB."
        );
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_body_too_large_message() {
        let err = ServerError::BodyTooLarge {
            max: HARD_MESSAGE_LIMIT,
        };
        assert_eq!(err.to_string(), "Request body too large. Maximum is 16MB.");
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_store_errors_map_to_taxonomy() {
        assert!(matches!(
            ServerError::from(StoreError::NotFound),
            ServerError::NotFound(_)
        ));
        let storage = ServerError::from(StoreError::Migration("boom".into()));
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(storage.public_message(), "Storage unavailable");
    }
}
