// SPDX-License-Identifier: MIT

//! Converting a [`HypervisorError`] into the JSON error body the public
//! listener promises: `{"error":{"message": string}}`, with the status code
//! pinned to the error kind per the specification's status code table.
//!
//! Kept as a plain function rather than an `IntoResponse` impl: both
//! `HypervisorError` and `IntoResponse` live outside this crate, so there is
//! no coherent trait impl to write here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use oxhv_core::HypervisorError;
use serde_json::json;

pub fn error_response(err: &HypervisorError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({ "error": { "message": err.message() } });
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queue_overflow_renders_503_with_fixed_message() {
        let response = error_response(&HypervisorError::QueueOverflow);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(value["error"]["message"], "Server busy");
    }

    #[tokio::test]
    async fn selection_error_renders_403() {
        let response = error_response(&HypervisorError::Selection("boom".to_string()));
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
