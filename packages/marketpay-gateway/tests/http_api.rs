//! Router tests through `tower::ServiceExt::oneshot`.

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use marketpay_gateway::testing::{intent, signed_boc, MockBackend, BUYER, ESCROW};
use marketpay_gateway::{create_router, AppState, Config};
use marketpay_types::{PaymentStatus, SignedTransaction};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app_with(config: Config) -> (Router, Arc<MockBackend>) {
    let backend = Arc::new(MockBackend::new());
    let state = AppState::with_backend(config, backend.clone()).expect("valid test config");
    (create_router(Arc::new(state)), backend)
}

fn app() -> (Router, Arc<MockBackend>) {
    app_with(Config {
        escrow_address: ESCROW.into(),
        ..Config::default()
    })
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Result<Value> {
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok(serde_json::from_slice(&bytes)?)
}

fn confirm_body(order_id: &str, boc: &str) -> Value {
    json!({
        "orderId": order_id,
        "intent": intent(),
        "boc": boc,
        "buyerWallet": BUYER,
    })
}

#[tokio::test]
async fn test_prepare_returns_ton_connect_request() -> Result<()> {
    let (app, _) = app();
    let response = app
        .oneshot(post(
            "/payments/prepare",
            json!({ "orderId": "order-1", "intent": intent() }),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await?;
    assert_eq!(body["orderId"], "order-1");
    let message = &body["transaction"]["messages"][0];
    assert_eq!(message["amount"], "20040000000");
    assert!(message["payload"].as_str().unwrap().starts_with("te6c"));
    assert!(body["transaction"]["validUntil"].as_u64().unwrap() > marketpay_types::now_secs());
    Ok(())
}

#[tokio::test]
async fn test_prepare_rejects_commission_out_of_range() -> Result<()> {
    let (app, _) = app();
    let mut bad = intent();
    bad.commission_percent = "655.36".into();
    let response = app
        .oneshot(post(
            "/payments/prepare",
            json!({ "orderId": "order-2", "intent": bad }),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await?;
    assert_eq!(body["code"], "commission_out_of_range");
    assert_eq!(body["retryable"], false);
    Ok(())
}

#[tokio::test]
async fn test_confirm_is_idempotent() -> Result<()> {
    let (app, backend) = app();
    let boc = signed_boc(7);

    let first = app
        .clone()
        .oneshot(post("/payments/confirm", confirm_body("order-3", &boc)))
        .await?;
    assert_eq!(first.status(), StatusCode::OK);
    let first = json_body(first).await?;
    assert_eq!(first["view"], "awaiting_confirmation");
    assert_eq!(first["record"]["status"], "PENDING");

    let second = app
        .oneshot(post("/payments/confirm", confirm_body("order-3", &boc)))
        .await?;
    let second = json_body(second).await?;
    assert_eq!(first["record"]["id"], second["record"]["id"]);
    assert_eq!(backend.create_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_repeat_confirm_reports_current_status() -> Result<()> {
    let (app, backend) = app();
    let boc = signed_boc(9);
    let hash = SignedTransaction::from_boc(&boc)?.hash().to_string();

    app.clone()
        .oneshot(post("/payments/confirm", confirm_body("order-3b", &boc)))
        .await?;
    backend.set_status(&hash, PaymentStatus::Completed);

    let again = app
        .clone()
        .oneshot(post("/payments/confirm", confirm_body("order-3b", &boc)))
        .await?;
    assert_eq!(again.status(), StatusCode::OK);
    let again = json_body(again).await?;
    assert_eq!(again["view"], "confirmed");
    assert_eq!(again["record"]["status"], "COMPLETED");

    let foreign = app
        .oneshot(post("/payments/confirm", confirm_body("order-3c", &boc)))
        .await?;
    assert_eq!(foreign.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(foreign).await?["code"], "invalid_intent");
    assert_eq!(backend.create_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_path_like_order_id_is_refused() -> Result<()> {
    let (app, backend) = app();
    let order_id = "../../admin/users/1?x=";
    let prepare = app
        .clone()
        .oneshot(post(
            "/payments/prepare",
            json!({ "orderId": order_id, "intent": intent() }),
        ))
        .await?;
    assert_eq!(prepare.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(prepare).await?["code"], "invalid_intent");

    let confirm = app
        .oneshot(post("/payments/confirm", confirm_body(order_id, &signed_boc(10))))
        .await?;
    assert_eq!(confirm.status(), StatusCode::BAD_REQUEST);
    assert_eq!(backend.create_calls(), 0);
    assert!(backend.paid_orders().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_confirm_rejects_unreadable_boc() -> Result<()> {
    let (app, backend) = app();
    let response = app
        .oneshot(post("/payments/confirm", confirm_body("order-4", "AAAA")))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await?["code"], "invalid_boc");
    assert_eq!(backend.stored_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_confirm_rejects_boc_with_inflated_cell_count() -> Result<()> {
    let (app, backend) = app();
    // Header announces 2^32-1 cells in 23 bytes.
    let boc = "te6ccgQB/////wAAAAEAAAAAAAAAAAA=";
    let response = app
        .oneshot(post("/payments/confirm", confirm_body("order-4b", boc)))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await?["code"], "invalid_boc");
    assert_eq!(backend.stored_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_payment_lookup_reflects_backend_status() -> Result<()> {
    let (app, backend) = app();
    let boc = signed_boc(8);
    let hash = SignedTransaction::from_boc(&boc)?.hash().to_string();

    let missing = app.clone().oneshot(get(&format!("/payments/{hash}"))).await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    app.clone()
        .oneshot(post("/payments/confirm", confirm_body("order-5", &boc)))
        .await?;
    backend.set_status(&hash, PaymentStatus::Completed);

    let found = app.clone().oneshot(get(&format!("/payments/{hash}"))).await?;
    assert_eq!(found.status(), StatusCode::OK);
    let body = json_body(found).await?;
    assert_eq!(body["view"], "confirmed");
    assert_eq!(body["message"], "Payment confirmed");

    let malformed = app.oneshot(get("/payments/not-a-hash")).await?;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_api_key_guards_payment_routes_only() -> Result<()> {
    let (app, _) = app_with(Config {
        escrow_address: ESCROW.into(),
        api_key: Some("s3cret".into()),
        ..Config::default()
    });
    let body = json!({ "orderId": "order-6", "intent": intent() });

    let denied = app.clone().oneshot(post("/payments/prepare", body.clone())).await?;
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let mut allowed = post("/payments/prepare", body);
    allowed
        .headers_mut()
        .insert("authorization", "Bearer s3cret".parse()?);
    assert_eq!(app.clone().oneshot(allowed).await?.status(), StatusCode::OK);

    assert_eq!(app.oneshot(get("/health")).await?.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_foreign_marketplace_is_refused() -> Result<()> {
    let (app, _) = app_with(Config {
        escrow_address: ESCROW.into(),
        marketplace_address: Some(
            "0:9999999999999999999999999999999999999999999999999999999999999999".into(),
        ),
        ..Config::default()
    });
    let response = app
        .oneshot(post(
            "/payments/prepare",
            json!({ "orderId": "order-7", "intent": intent() }),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await?["code"], "invalid_intent");
    Ok(())
}

#[tokio::test]
async fn test_request_id_is_echoed() -> Result<()> {
    let (app, _) = app();
    let mut request = get("/health");
    request
        .headers_mut()
        .insert("x-request-id", "trace-123".parse()?);
    let response = app.clone().oneshot(request).await?;
    assert_eq!(response.headers()["x-request-id"], "trace-123");

    let generated = app.oneshot(get("/health")).await?;
    let id = generated.headers()["x-request-id"].to_str()?;
    assert!(id.starts_with("mp-"));
    Ok(())
}

#[tokio::test]
async fn test_metrics_and_ready() -> Result<()> {
    let (app, _) = app();
    let ready = app.clone().oneshot(get("/ready")).await?;
    assert_eq!(ready.status(), StatusCode::OK);

    let metrics = app.oneshot(get("/metrics")).await?;
    assert_eq!(metrics.status(), StatusCode::OK);
    let bytes = metrics.into_body().collect().await?.to_bytes();
    let text = String::from_utf8(bytes.to_vec())?;
    assert!(text.contains("marketpay_payments_prepared_total"));
    assert!(text.contains("marketpay_cached_records"));
    Ok(())
}
