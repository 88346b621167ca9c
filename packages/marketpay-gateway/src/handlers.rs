//! HTTP request handlers.

use crate::metrics::METRICS;
use crate::middleware::RequestId;
use crate::response::{
    ConfirmRequest, HealthResponse, PaymentResponse, PrepareRequest, PrepareResponse,
};
use crate::state::AppState;
use crate::Error;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use marketpay_types::{Address, PaymentError, SignedTransaction, TransferIntent};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

/// Readiness check. 200 once the backend has answered a health check.
pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if !state.ready.load(Ordering::Relaxed) && state.backend.health_check().await != "unavailable" {
        state.ready.store(true, Ordering::Relaxed);
    }

    if state.ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Prometheus metrics in text exposition format.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = METRICS.render(state.recorder.cached_count());
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let backend_status = state.backend.health_check().await;
    let status = match backend_status {
        "ok" => "ok",
        "degraded" => "degraded",
        _ => "unavailable",
    };

    Json(HealthResponse {
        status,
        escrow_address: state.config.escrow_address.clone(),
        backend_url: state.config.backend_url.clone(),
        backend_status,
        uptime_secs: state.start_time.elapsed().as_secs(),
        requests: state.request_count.load(Ordering::Relaxed),
        cached_records: state.recorder.cached_count(),
    })
}

/// Build the TON Connect request for an order. `POST /payments/prepare`
pub async fn prepare(
    State(state): State<Arc<AppState>>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<PrepareRequest>,
) -> Result<Json<PrepareResponse>, Error> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    check_order_id(&body.order_id)?;
    check_marketplace(&state, &body.intent)?;

    let transaction = state
        .builder
        .build(&body.intent, &state.config.escrow_address)
        .inspect_err(|e| {
            METRICS.payments_failed.fetch_add(1, Ordering::Relaxed);
            warn!(req_id = %req_id.0, order_id = %body.order_id, error = %e, "Prepare rejected");
        })?;
    METRICS.payments_prepared.fetch_add(1, Ordering::Relaxed);
    info!(
        req_id = %req_id.0,
        order_id = %body.order_id,
        amount = %transaction.attached_amount(),
        valid_until = transaction.valid_until,
        "Payment prepared"
    );

    Ok(Json(PrepareResponse {
        success: true,
        order_id: body.order_id,
        transaction,
    }))
}

/// Record a wallet-signed payment. `POST /payments/confirm`
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<ConfirmRequest>,
) -> Result<Json<PaymentResponse>, Error> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    check_order_id(&body.order_id)?;
    check_marketplace(&state, &body.intent)?;

    let result: Result<_, PaymentError> = async {
        let signed = SignedTransaction::from_boc(&body.boc)?;
        state
            .recorder
            .record(&signed, &body.order_id, &body.intent, &body.buyer_wallet)
            .await
    }
    .await;

    match result {
        Ok(record) => {
            info!(req_id = %req_id.0, order_id = %body.order_id, tx_hash = %record.transaction_hash, "Payment confirmed");
            Ok(Json(PaymentResponse::new(record)))
        }
        Err(e) => {
            METRICS.payments_failed.fetch_add(1, Ordering::Relaxed);
            warn!(req_id = %req_id.0, order_id = %body.order_id, error = %e, "Confirm failed");
            Err(e.into())
        }
    }
}

/// Authoritative record for a transaction. `GET /payments/{tx_hash}`
pub async fn payment(
    State(state): State<Arc<AppState>>,
    Path(tx_hash): Path<String>,
) -> Result<Json<PaymentResponse>, Error> {
    let tx_hash = tx_hash.to_ascii_lowercase();
    if tx_hash.len() != 64 || !tx_hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(PaymentError::InvalidIntent("tx_hash must be 64 hex characters".into()).into());
    }

    match state.recorder.refresh(&tx_hash).await? {
        Some(record) => Ok(Json(PaymentResponse::new(record))),
        None => Err(Error::NotFound(format!("payment {tx_hash}"))),
    }
}

/// Order ids travel into backend URLs: 1 to 128 of `[A-Za-z0-9_-]`.
fn check_order_id(order_id: &str) -> Result<(), Error> {
    let valid = (1..=128).contains(&order_id.len())
        && order_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if !valid {
        return Err(PaymentError::InvalidIntent(format!("malformed order id '{order_id}'")).into());
    }
    Ok(())
}

/// Refuse intents that pay a marketplace other than the configured one.
fn check_marketplace(state: &AppState, intent: &TransferIntent) -> Result<(), Error> {
    let Some(expected) = &state.config.marketplace_address else {
        return Ok(());
    };
    let expected = Address::parse(expected)?;
    let given = Address::parse(&intent.marketplace_address)?;
    if given != expected {
        return Err(PaymentError::InvalidIntent(format!(
            "marketplace address {given} is not accepted"
        ))
        .into());
    }
    Ok(())
}
