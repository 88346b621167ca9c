//! API key check and request correlation.

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Validate `X-Api-Key` or `Authorization: Bearer`.
/// Open when no key is configured (dev mode).
pub async fn api_key_auth(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let Some(expected) = state.config.api_key() else {
        return next.run(request).await;
    };

    let headers = request.headers();
    let provided = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
        });

    let authorized = matches!(
        provided,
        Some(key) if key.len() == expected.len() && bool::from(key.as_bytes().ct_eq(expected.as_bytes()))
    );
    if authorized {
        return next.run(request).await;
    }

    let body = serde_json::json!({
        "success": false,
        "code": "unauthorized",
        "error": "invalid or missing API key"
    });
    (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
}

/// Propagate or generate `x-request-id`.
pub async fn inject_request_id(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            use rand::Rng;
            format!("mp-{:016x}", rand::thread_rng().gen::<u64>())
        });

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(val) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", val);
    }
    response
}

/// Correlation id, extractable with `Extension<RequestId>`.
#[derive(Clone, Debug, Default)]
pub struct RequestId(pub String);
