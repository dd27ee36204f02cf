//! HTTP error envelope: `{"error":{"kind","message","retryable"}}`, with
//! `EngineError::kind()` mapped onto the HTTP status taxonomy. Kinds with
//! no HTTP mapping never reach here — they only ever surface as a
//! task-lifecycle `error` event over SSE.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use alex_engine::EngineError;

pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
    retryable: bool,
}

fn status_for(kind: &str) -> StatusCode {
    match kind {
        "invalid_request" => StatusCode::BAD_REQUEST,
        "unauthorized" => StatusCode::UNAUTHORIZED,
        "not_found" => StatusCode::NOT_FOUND,
        "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
        "context_length_exceeded" => StatusCode::PAYLOAD_TOO_LARGE,
        "upstream_unavailable" => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        let body = ErrorEnvelope {
            error: ErrorBody {
                kind,
                message: self.0.to_string(),
                retryable: self.0.recoverable(),
            },
        };
        (status, Json(body)).into_response()
    }
}
