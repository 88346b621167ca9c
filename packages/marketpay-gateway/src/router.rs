//! HTTP router setup.

use crate::handlers;
use crate::middleware::{api_key_auth, inject_request_id};
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the application router. Payment routes sit behind the API key;
/// health, readiness and metrics do not.
pub fn create(state: Arc<AppState>) -> Router {
    let payments = Router::new()
        .route("/payments/prepare", post(handlers::prepare))
        .route("/payments/confirm", post(handlers::confirm))
        .route("/payments/{tx_hash}", get(handlers::payment))
        .route_layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            api_key_auth,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/metrics", get(handlers::metrics))
        .merge(payments)
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(ConcurrencyLimitLayer::new(state.config.max_concurrent_requests))
        .layer(cors)
        .layer(axum::middleware::from_fn(inject_request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
