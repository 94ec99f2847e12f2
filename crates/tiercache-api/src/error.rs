//! API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tiercache_core::{CoreError, RecordError};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rejected write; the body is the bare reason code
    #[error("Invalid write: {0}")]
    InvalidRecord(RecordError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl From<RecordError> for ApiError {
    fn from(err: RecordError) -> Self {
        ApiError::InvalidRecord(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Bodies are plain text: the edge cache and clients match on them
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::InvalidRecord(reason) => {
                (StatusCode::BAD_REQUEST, reason.as_str().to_string())
            }
            ApiError::Core(e) => match e {
                CoreError::InvalidRecord(reason) => {
                    (StatusCode::BAD_REQUEST, reason.as_str().to_string())
                }
                CoreError::InvalidEntry(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            },
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_errors_render_reason_code() {
        let response = ApiError::from(RecordError::NoTtl).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::Core(CoreError::InvalidRecord(RecordError::NoData)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::Core(CoreError::Configuration("boom".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
