//! End-to-end payment attempt: encode, build, submit, record.

use marketpay_types::{
    OrderPaymentView, PaymentError, PaymentRecord, SignedTransaction, TransactionRequestBuilder,
    TransferIntent,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::metrics::METRICS;
use crate::recorder::PaymentRecorder;
use crate::wallet::WalletSubmissionClient;

/// Progress of one payment attempt, as shown on the order page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStage {
    Idle,
    Preparing,
    AwaitingSignature { valid_until: u64 },
    Recording { tx_hash: String },
    Submitted { view: OrderPaymentView, tx_hash: String },
    Failed { code: &'static str, retryable: bool },
}

/// The page that started a payment. Once cancelled, stage updates are dropped.
pub struct PageView {
    cancel: CancellationToken,
    stage: watch::Sender<FlowStage>,
}

impl PageView {
    pub fn new() -> Self {
        let (stage, _) = watch::channel(FlowStage::Idle);
        Self {
            cancel: CancellationToken::new(),
            stage,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FlowStage> {
        self.stage.subscribe()
    }

    pub fn stage(&self) -> FlowStage {
        self.stage.borrow().clone()
    }

    /// Navigation away from the page.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn publish(&self, stage: FlowStage) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.stage.send_replace(stage);
    }
}

impl Default for PageView {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub record: PaymentRecord,
    pub view: OrderPaymentView,
    pub transaction: SignedTransaction,
}

pub struct PaymentFlow {
    builder: TransactionRequestBuilder,
    destination: String,
    wallet: Arc<WalletSubmissionClient>,
    recorder: Arc<PaymentRecorder>,
}

impl PaymentFlow {
    pub fn new(
        builder: TransactionRequestBuilder,
        destination: impl Into<String>,
        wallet: Arc<WalletSubmissionClient>,
        recorder: Arc<PaymentRecorder>,
    ) -> Self {
        Self {
            builder,
            destination: destination.into(),
            wallet,
            recorder,
        }
    }

    /// Run one attempt for `order_id`.
    ///
    /// After the wallet signs, recording runs on its own task, so it
    /// completes even if `view` is cancelled or this future is dropped.
    pub async fn pay(
        &self,
        order_id: &str,
        intent: &TransferIntent,
        view: &PageView,
    ) -> Result<PaymentOutcome, PaymentError> {
        let result = self.run(order_id, intent, view).await;
        if let Err(e) = &result {
            METRICS.payments_failed.fetch_add(1, Ordering::Relaxed);
            warn!(order_id, error = %e, "Payment attempt failed");
            view.publish(FlowStage::Failed {
                code: e.code(),
                retryable: e.is_retryable(),
            });
        }
        result
    }

    async fn run(
        &self,
        order_id: &str,
        intent: &TransferIntent,
        view: &PageView,
    ) -> Result<PaymentOutcome, PaymentError> {
        view.publish(FlowStage::Preparing);
        let request = self.builder.build(intent, &self.destination)?;
        METRICS.payments_prepared.fetch_add(1, Ordering::Relaxed);

        view.publish(FlowStage::AwaitingSignature {
            valid_until: request.valid_until,
        });
        let signed = self.wallet.submit(&request).await?;
        let buyer = self
            .wallet
            .account()
            .ok_or(PaymentError::WalletNotConnected)?
            .address;

        view.publish(FlowStage::Recording {
            tx_hash: signed.hash().to_string(),
        });
        if view.is_cancelled() {
            info!(order_id, tx_hash = %signed.hash(), "Page view gone, recording anyway");
        }

        let task = {
            let recorder = Arc::clone(&self.recorder);
            let signed = signed.clone();
            let order_id = order_id.to_string();
            let intent = intent.clone();
            tokio::spawn(async move { recorder.record(&signed, &order_id, &intent, &buyer).await })
        };
        let record = task
            .await
            .map_err(|e| PaymentError::BackendRecordFailed(format!("record task: {e}")))??;

        let order_view = OrderPaymentView::from(record.status);
        view.publish(FlowStage::Submitted {
            view: order_view,
            tx_hash: record.transaction_hash.clone(),
        });
        info!(order_id, tx_hash = %record.transaction_hash, view = ?order_view, "Payment submitted");

        Ok(PaymentOutcome {
            record,
            view: order_view,
            transaction: signed,
        })
    }
}
