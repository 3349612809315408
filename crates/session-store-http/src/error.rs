//! Error responses for the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use session_store_core::SessionError;

/// A session error on its way to the client.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub SessionError);

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            SessionError::LockTimeout { .. } => (StatusCode::CONFLICT, "LOCK_TIMEOUT"),
            SessionError::Write { .. } => (StatusCode::SERVICE_UNAVAILABLE, "WRITE_ERROR"),
            SessionError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORE_ERROR"),
            SessionError::Configuration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorBody {
            error: String,
            code: &'static str,
        }

        let (status, code) = self.status_and_code();
        let body = ErrorBody {
            error: self.to_string(),
            code,
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use session_store_core::StoreError;

    #[test]
    fn test_status_mapping() {
        let timeout = ApiError(SessionError::LockTimeout {
            session_id: "abc".to_string(),
            waited: Duration::from_secs(30),
        });
        assert_eq!(timeout.status_and_code(), (StatusCode::CONFLICT, "LOCK_TIMEOUT"));

        let write = ApiError(SessionError::Write {
            session_id: "abc".to_string(),
            source: StoreError::Io("down".to_string()),
        });
        assert_eq!(write.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
