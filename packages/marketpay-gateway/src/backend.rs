//! Marketplace backend client (payments + orders API).

use async_trait::async_trait;
use marketpay_types::{PaymentRecord, PaymentSubmission};
use reqwest::{StatusCode, Url};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, warn};

use crate::metrics::METRICS;
use crate::Error;

/// Backend that owns payment records and order status.
#[async_trait]
pub trait PaymentBackend: Send + Sync {
    /// Create a payment record. Must be idempotent on `transaction_hash`.
    async fn create_payment(&self, submission: &PaymentSubmission) -> Result<PaymentRecord, Error>;

    /// Look up a record by transaction hash. `None` when the backend has none.
    async fn find_payment(&self, tx_hash: &str) -> Result<Option<PaymentRecord>, Error>;

    /// Move the order to `paid`.
    async fn mark_order_paid(&self, order_id: &str) -> Result<(), Error>;

    /// `"ok"`, `"degraded"` or `"unavailable"`.
    async fn health_check(&self) -> &'static str {
        "ok"
    }
}

/// reqwest-backed [`PaymentBackend`].
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("backend client: {e}")))?;
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("backend_url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("backend_url: {base_url} cannot be a base")));
        }
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Appends `segments` to the base path. Each segment is percent-encoded,
    /// so `/`, `?` and `..` inside an id stay inside that segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

fn backend_error(context: &str, e: impl std::fmt::Display) -> Error {
    METRICS.backend_errors.fetch_add(1, Ordering::Relaxed);
    warn!(context, error = %e, "Backend call failed");
    Error::Backend(format!("{context}: {e}"))
}

async fn read_record(resp: reqwest::Response, context: &str) -> Result<PaymentRecord, Error> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(backend_error(context, format!("HTTP {status}: {body}")));
    }
    resp.json::<PaymentRecord>()
        .await
        .map_err(|e| backend_error(context, e))
}

#[async_trait]
impl PaymentBackend for HttpBackend {
    async fn create_payment(&self, submission: &PaymentSubmission) -> Result<PaymentRecord, Error> {
        debug!(order_id = %submission.order_id, tx_hash = %submission.transaction_hash, "POST /payments");
        let resp = self
            .client
            .post(self.url(&["payments"]))
            .header("Idempotency-Key", &submission.transaction_hash)
            .json(submission)
            .send()
            .await
            .map_err(|e| backend_error("create_payment", e))?;
        read_record(resp, "create_payment").await
    }

    async fn find_payment(&self, tx_hash: &str) -> Result<Option<PaymentRecord>, Error> {
        let resp = self
            .client
            .get(self.url(&["payments", "by-hash", tx_hash]))
            .send()
            .await
            .map_err(|e| backend_error("find_payment", e))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        read_record(resp, "find_payment").await.map(Some)
    }

    async fn mark_order_paid(&self, order_id: &str) -> Result<(), Error> {
        let resp = self
            .client
            .patch(self.url(&["orders", order_id, "status"]))
            .json(&serde_json::json!({ "status": "paid" }))
            .send()
            .await
            .map_err(|e| backend_error("mark_order_paid", e))?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(backend_error("mark_order_paid", format!("HTTP {status}")))
        }
    }

    async fn health_check(&self) -> &'static str {
        match self.client.get(self.url(&["health"])).send().await {
            Ok(resp) if resp.status().is_success() => "ok",
            Ok(_) => "degraded",
            Err(_) => "unavailable",
        }
    }
}
