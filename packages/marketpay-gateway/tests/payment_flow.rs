//! End-to-end payment attempts against in-memory wallet and backend.

use anyhow::Result;
use marketpay_gateway::testing::{intent, signed_boc, MockBackend, MockWallet, BUYER, ESCROW};
use marketpay_gateway::{
    FlowStage, PageView, PaymentFlow, PaymentRecorder, SubmissionState, WalletSubmissionClient,
};
use marketpay_types::{
    Nano, OrderPaymentView, PaymentError, PaymentStatus, SignedTransaction,
    TransactionRequestBuilder,
};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    wallet: Arc<MockWallet>,
    backend: Arc<MockBackend>,
    client: Arc<WalletSubmissionClient>,
    recorder: Arc<PaymentRecorder>,
    flow: Arc<PaymentFlow>,
}

fn harness(wallet: MockWallet) -> Harness {
    let wallet = Arc::new(wallet);
    let backend = Arc::new(MockBackend::new());
    let client = Arc::new(WalletSubmissionClient::new(
        wallet.clone(),
        Duration::from_secs(5),
    ));
    let recorder = Arc::new(PaymentRecorder::new(backend.clone(), Nano(50_000_000)));
    let flow = Arc::new(PaymentFlow::new(
        TransactionRequestBuilder::new(),
        ESCROW,
        Arc::clone(&client),
        Arc::clone(&recorder),
    ));
    Harness {
        wallet,
        backend,
        client,
        recorder,
        flow,
    }
}

#[tokio::test]
async fn test_pay_records_once_and_awaits_confirmation() -> Result<()> {
    let h = harness(MockWallet::approving());
    let view = PageView::new();

    let outcome = h.flow.pay("order-100", &intent(), &view).await?;

    assert_eq!(outcome.view, OrderPaymentView::AwaitingConfirmation);
    assert_eq!(outcome.record.amount, Nano(19_990_000_000));
    assert_eq!(outcome.record.transaction_hash, outcome.transaction.hash());
    assert_eq!(h.backend.stored_count(), 1);
    assert!(matches!(view.stage(), FlowStage::Submitted { .. }));
    Ok(())
}

#[tokio::test]
async fn test_expired_request_fails_without_wallet_answer() -> Result<()> {
    let h = harness(MockWallet::approving().with_gate());
    let builder = TransactionRequestBuilder::new();
    let mut request = builder.build(&intent(), ESCROW)?;
    request.valid_until = marketpay_types::now_secs() - 1;

    let err = h.client.submit(&request).await.unwrap_err();
    assert!(matches!(err, PaymentError::SubmissionExpired { .. }));
    assert_eq!(h.wallet.send_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_submit_fails_fast() -> Result<()> {
    let h = harness(MockWallet::approving().with_gate());
    let request = TransactionRequestBuilder::new().build(&intent(), ESCROW)?;
    let mut states = h.client.subscribe();

    let first = {
        let client = Arc::clone(&h.client);
        let request = request.clone();
        tokio::spawn(async move { client.submit(&request).await })
    };
    states
        .wait_for(|s| matches!(s.submission, SubmissionState::AwaitingSignature { .. }))
        .await?;

    let second = h.client.submit(&request).await;
    assert_eq!(second.unwrap_err(), PaymentError::SubmissionInProgress);

    h.wallet.open_gate();
    let signed = first.await??;
    assert_eq!(signed.hash().len(), 64);
    assert_eq!(h.wallet.send_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_record_retry_after_backend_timeout_keeps_one_record() -> Result<()> {
    let h = harness(MockWallet::approving());
    let signed = SignedTransaction::from_boc(&signed_boc(42))?;
    h.backend.lose_next_create_response();

    let first = h
        .recorder
        .record(&signed, "order-200", &intent(), BUYER)
        .await;
    assert!(matches!(first, Err(PaymentError::BackendRecordFailed(_))));

    let second = h
        .recorder
        .record(&signed, "order-200", &intent(), BUYER)
        .await?;
    assert_eq!(second.transaction_hash, signed.hash());
    assert_eq!(h.backend.stored_count(), 1);
    assert_eq!(h.backend.create_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_navigating_away_mid_signature_still_records() -> Result<()> {
    let h = harness(MockWallet::approving().with_gate());
    let view = Arc::new(PageView::new());
    let mut stages = view.subscribe();

    let pending = {
        let flow = Arc::clone(&h.flow);
        let view = Arc::clone(&view);
        tokio::spawn(async move { flow.pay("order-300", &intent(), &view).await })
    };
    stages
        .wait_for(|s| matches!(s, FlowStage::AwaitingSignature { .. }))
        .await?;

    view.cancel();
    h.wallet.open_gate();
    pending.await??;

    assert_eq!(h.backend.stored_count(), 1);
    // Late stages are not published to a page that is gone.
    assert!(matches!(view.stage(), FlowStage::AwaitingSignature { .. }));
    Ok(())
}

#[tokio::test]
async fn test_rejected_then_fresh_request_succeeds() -> Result<()> {
    let h = harness(MockWallet::approving());
    h.wallet.set_approve(false);
    let view = PageView::new();

    let err = h.flow.pay("order-400", &intent(), &view).await.unwrap_err();
    assert!(matches!(err, PaymentError::SubmissionRejected(_)));
    assert_eq!(h.backend.stored_count(), 0);

    h.wallet.set_approve(true);
    let outcome = h.flow.pay("order-400", &intent(), &view).await?;
    assert_eq!(outcome.record.order_id, "order-400");

    h.backend.set_status(outcome.transaction.hash(), PaymentStatus::Completed);
    let refreshed = h.recorder.refresh(outcome.transaction.hash()).await?;
    assert_eq!(
        refreshed.map(|r| OrderPaymentView::from(r.status)),
        Some(OrderPaymentView::Confirmed)
    );
    Ok(())
}
