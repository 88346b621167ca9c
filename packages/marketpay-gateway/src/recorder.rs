//! Idempotent payment recording keyed by transaction hash.

use marketpay_types::{
    Address, Nano, OrderPaymentView, PaymentError, PaymentRecord, PaymentStatus,
    PaymentSubmission, SignedTransaction, TransferIntent,
};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};

use crate::backend::PaymentBackend;
use crate::metrics::METRICS;

/// Cached records above which the cache is compacted.
const MAX_CACHED_RECORDS: usize = 10_000;

/// Records signed payments with the backend, at most once per hash.
pub struct PaymentRecorder {
    backend: Arc<dyn PaymentBackend>,
    gas_fee: Nano,
    records: Mutex<HashMap<String, PaymentRecord>>,
    max_cached: usize,
    // Serializes lookup-then-create so two callers with the same hash
    // cannot both miss and both create.
    record_lock: tokio::sync::Mutex<()>,
}

impl PaymentRecorder {
    pub fn new(backend: Arc<dyn PaymentBackend>, gas_fee: Nano) -> Self {
        Self {
            backend,
            gas_fee,
            records: Mutex::new(HashMap::new()),
            max_cached: MAX_CACHED_RECORDS,
            record_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_cache_limit(mut self, max_cached: usize) -> Self {
        self.max_cached = max_cached.max(1);
        self
    }

    /// Record `signed` for `order_id`.
    ///
    /// Amount and addresses come from `intent`, the hash from `signed`.
    /// Safe to call again with the same transaction after a failure. Only
    /// final records are answered from cache; anything still in flight is
    /// re-read from the backend. A hash already recorded for another order
    /// is refused.
    pub async fn record(
        &self,
        signed: &SignedTransaction,
        order_id: &str,
        intent: &TransferIntent,
        buyer_wallet: &str,
    ) -> Result<PaymentRecord, PaymentError> {
        let tx_hash = signed.hash();
        if let Some(cached) = self.settled(tx_hash, order_id)? {
            return Ok(cached);
        }

        let payload = intent.validate()?;
        let buyer = Address::parse(buyer_wallet)?;
        let submission =
            PaymentSubmission::new(order_id, &payload, &buyer.to_string(), signed, self.gas_fee);

        let _lock = self.record_lock.lock().await;
        if let Some(cached) = self.settled(tx_hash, order_id)? {
            return Ok(cached);
        }

        let start = Instant::now();
        let result = self.find_or_create(&submission).await;
        METRICS.record_backend_duration(start);

        let record = result.map_err(|e| {
            warn!(order_id, tx_hash, error = %e, "Payment record failed");
            PaymentError::BackendRecordFailed(e.to_string())
        })?;
        if record.transaction_hash != tx_hash {
            return Err(PaymentError::BackendRecordFailed(format!(
                "backend returned record for {} instead of {tx_hash}",
                record.transaction_hash
            )));
        }
        ensure_same_order(&record, order_id)?;

        METRICS.payments_recorded.fetch_add(1, Ordering::Relaxed);
        info!(order_id, tx_hash, record_id = %record.id, status = ?record.status, "Payment recorded");
        self.store(record.clone()).await;
        Ok(record)
    }

    async fn find_or_create(&self, submission: &PaymentSubmission) -> Result<PaymentRecord, crate::Error> {
        if let Some(existing) = self.backend.find_payment(&submission.transaction_hash).await? {
            info!(tx_hash = %existing.transaction_hash, "Backend already holds this payment");
            return Ok(existing);
        }
        self.backend.create_payment(submission).await
    }

    /// Re-read the authoritative record from the backend.
    pub async fn refresh(&self, tx_hash: &str) -> Result<Option<PaymentRecord>, PaymentError> {
        let found = self
            .backend
            .find_payment(tx_hash)
            .await
            .map_err(|e| PaymentError::BackendRecordFailed(e.to_string()))?;
        if let Some(record) = &found {
            self.store(record.clone()).await;
        }
        Ok(found)
    }

    /// What the order page may show for `tx_hash`, if recorded here.
    pub fn order_view(&self, tx_hash: &str) -> Option<OrderPaymentView> {
        self.cached(tx_hash).map(|r| OrderPaymentView::from(r.status))
    }

    pub fn cached_count(&self) -> usize {
        self.lock_records().len()
    }

    fn cached(&self, tx_hash: &str) -> Option<PaymentRecord> {
        self.lock_records().get(tx_hash).cloned()
    }

    /// Cached record for `tx_hash` if its status can no longer change.
    fn settled(&self, tx_hash: &str, order_id: &str) -> Result<Option<PaymentRecord>, PaymentError> {
        let Some(cached) = self.cached(tx_hash) else {
            return Ok(None);
        };
        ensure_same_order(&cached, order_id)?;
        if !cached.status.is_final() {
            return Ok(None);
        }
        METRICS.record_cache_hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(cached))
    }

    /// Cache `record`; notify the order endpoint on the first Completed.
    async fn store(&self, record: PaymentRecord) {
        let newly_completed = {
            let mut records = self.lock_records();
            let was_completed = records
                .get(&record.transaction_hash)
                .is_some_and(|r| r.status == PaymentStatus::Completed);
            let completed = record.status == PaymentStatus::Completed;
            records.insert(record.transaction_hash.clone(), record.clone());
            if records.len() > self.max_cached {
                compact(&mut records, self.max_cached);
            }
            completed && !was_completed
        };

        if newly_completed {
            if let Err(e) = self.backend.mark_order_paid(&record.order_id).await {
                warn!(order_id = %record.order_id, error = %e, "Failed to mark order paid");
            }
        }
    }

    fn lock_records(&self) -> std::sync::MutexGuard<'_, HashMap<String, PaymentRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drops final records first; the backend stays authoritative for them.
/// In-flight records go too if that is not enough, and are re-read on demand.
fn compact(records: &mut HashMap<String, PaymentRecord>, max_cached: usize) {
    let before = records.len();
    records.retain(|_, r| !r.status.is_final());
    if records.len() > max_cached {
        records.clear();
    }
    info!(removed = before - records.len(), remaining = records.len(), "Compacted payment cache");
}

fn ensure_same_order(record: &PaymentRecord, order_id: &str) -> Result<(), PaymentError> {
    if record.order_id == order_id {
        return Ok(());
    }
    warn!(
        tx_hash = %record.transaction_hash,
        recorded_for = %record.order_id,
        requested_for = order_id,
        "Transaction already recorded for another order"
    );
    Err(PaymentError::InvalidIntent(format!(
        "transaction {} belongs to another order",
        record.transaction_hash
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{intent, signed, MockBackend, BUYER};

    fn recorder(backend: Arc<MockBackend>) -> PaymentRecorder {
        PaymentRecorder::new(backend, Nano(50_000_000))
    }

    #[tokio::test]
    async fn test_record_builds_submission_from_intent() {
        let backend = Arc::new(MockBackend::new());
        let recorder = recorder(backend.clone());
        let tx = signed(1);
        let record = recorder.record(&tx, "order-1", &intent(), BUYER).await.unwrap();

        assert_eq!(record.transaction_hash, tx.hash());
        assert_eq!(record.amount, Nano(19_990_000_000));
        let sent = backend.submissions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].commission, Nano(499_750_000));
        assert_eq!(sent[0].gas_fee, Nano(50_000_000));
        assert_eq!(sent[0].transaction_hash, tx.hash());
        assert_eq!(
            recorder.order_view(tx.hash()),
            Some(OrderPaymentView::AwaitingConfirmation)
        );
    }

    #[tokio::test]
    async fn test_repeat_record_is_cached() {
        let backend = Arc::new(MockBackend::new());
        let recorder = recorder(backend.clone());
        let tx = signed(2);
        let first = recorder.record(&tx, "order-2", &intent(), BUYER).await.unwrap();
        let second = recorder.record(&tx, "order-2", &intent(), BUYER).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.create_calls(), 1);
        assert_eq!(recorder.cached_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_after_lost_response_does_not_duplicate() {
        let backend = Arc::new(MockBackend::new());
        backend.lose_next_create_response();
        let recorder = recorder(backend.clone());
        let tx = signed(3);

        let err = recorder.record(&tx, "order-3", &intent(), BUYER).await.unwrap_err();
        assert!(matches!(err, PaymentError::BackendRecordFailed(_)));
        assert!(err.is_retryable());

        let record = recorder.record(&tx, "order-3", &intent(), BUYER).await.unwrap();
        assert_eq!(record.transaction_hash, tx.hash());
        assert_eq!(backend.stored_count(), 1);
        assert_eq!(backend.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_records_create_once() {
        let backend = Arc::new(MockBackend::new());
        let recorder = Arc::new(recorder(backend.clone()));
        let tx = signed(4);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let recorder = Arc::clone(&recorder);
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                recorder.record(&tx, "order-4", &intent(), BUYER).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(backend.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_intent_never_reaches_backend() {
        let backend = Arc::new(MockBackend::new());
        let recorder = recorder(backend.clone());
        let mut bad = intent();
        bad.amount = "-1".into();
        let err = recorder.record(&signed(5), "order-5", &bad, BUYER).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidAmount(_)));
        assert_eq!(backend.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_marks_order_paid_once() {
        let backend = Arc::new(MockBackend::new());
        let recorder = recorder(backend.clone());
        let tx = signed(6);
        recorder.record(&tx, "order-6", &intent(), BUYER).await.unwrap();
        assert!(backend.paid_orders().is_empty());

        backend.set_status(tx.hash(), PaymentStatus::Completed);
        let refreshed = recorder.refresh(tx.hash()).await.unwrap().unwrap();
        assert_eq!(refreshed.status, PaymentStatus::Completed);
        assert_eq!(recorder.order_view(tx.hash()), Some(OrderPaymentView::Confirmed));

        recorder.refresh(tx.hash()).await.unwrap();
        assert_eq!(backend.paid_orders(), vec!["order-6".to_string()]);
    }

    #[tokio::test]
    async fn test_mark_paid_failure_is_not_fatal() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_mark_paid();
        backend.complete_on_create();
        let recorder = recorder(backend.clone());
        let record = recorder.record(&signed(7), "order-7", &intent(), BUYER).await.unwrap();
        assert_eq!(record.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_repeat_record_sees_backend_status_change() {
        let backend = Arc::new(MockBackend::new());
        let recorder = recorder(backend.clone());
        let tx = signed(8);
        let first = recorder.record(&tx, "order-8", &intent(), BUYER).await.unwrap();
        assert_eq!(first.status, PaymentStatus::Pending);

        backend.set_status(tx.hash(), PaymentStatus::Completed);
        let second = recorder.record(&tx, "order-8", &intent(), BUYER).await.unwrap();
        assert_eq!(second.status, PaymentStatus::Completed);
        assert_eq!(recorder.order_view(tx.hash()), Some(OrderPaymentView::Confirmed));
        assert_eq!(backend.paid_orders(), vec!["order-8".to_string()]);
        assert_eq!(backend.create_calls(), 1);

        // Final now: answered from cache even if the backend drifts.
        backend.set_status(tx.hash(), PaymentStatus::Pending);
        let third = recorder.record(&tx, "order-8", &intent(), BUYER).await.unwrap();
        assert_eq!(third.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_hash_recorded_for_other_order_is_refused() {
        let backend = Arc::new(MockBackend::new());
        let recorder = recorder(backend.clone());
        let tx = signed(9);
        recorder.record(&tx, "order-9", &intent(), BUYER).await.unwrap();

        let err = recorder.record(&tx, "order-10", &intent(), BUYER).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidIntent(_)));
        assert!(!err.is_retryable());

        // Also refused once final, and when only the backend knows the hash.
        backend.set_status(tx.hash(), PaymentStatus::Completed);
        recorder.refresh(tx.hash()).await.unwrap();
        assert!(recorder.record(&tx, "order-10", &intent(), BUYER).await.is_err());

        let fresh = super::PaymentRecorder::new(backend.clone(), Nano(50_000_000));
        let err = fresh.record(&tx, "order-10", &intent(), BUYER).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidIntent(_)));
        assert_eq!(fresh.cached_count(), 0);
        assert_eq!(backend.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_stays_bounded() {
        let backend = Arc::new(MockBackend::new());
        backend.complete_on_create();
        let recorder = recorder(backend.clone()).with_cache_limit(2);
        for n in 20..25 {
            let order_id = format!("order-{n}");
            recorder.record(&signed(n), &order_id, &intent(), BUYER).await.unwrap();
            assert!(recorder.cached_count() <= 2);
        }

        // Evicted hashes are still answered, from the backend.
        let again = recorder.record(&signed(20), "order-20", &intent(), BUYER).await.unwrap();
        assert_eq!(again.status, PaymentStatus::Completed);
        assert_eq!(backend.create_calls(), 5);
    }

    #[tokio::test]
    async fn test_refresh_unknown_hash() {
        let recorder = recorder(Arc::new(MockBackend::new()));
        assert_eq!(recorder.refresh("00").await.unwrap(), None);
        assert_eq!(recorder.order_view("00"), None);
    }
}
