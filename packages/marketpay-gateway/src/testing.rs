//! In-memory wallet and backend shared by unit and integration tests.
//! Built for `cfg(test)` and behind the `testing` feature.

use async_trait::async_trait;
use marketpay_types::boc::serialize_boc_base64;
use marketpay_types::cell::CellBuilder;
use marketpay_types::{
    now_secs, PaymentRecord, PaymentStatus, PaymentSubmission, SignedTransaction,
    TransactionRequest, TransactionRequestBuilder, TransferIntent,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::backend::PaymentBackend;
use crate::wallet::{WalletAccount, WalletConnector, WalletError};
use crate::Error;

pub const SELLER: &str = "0:1111111111111111111111111111111111111111111111111111111111111111";
pub const MARKETPLACE: &str = "0:2222222222222222222222222222222222222222222222222222222222222222";
pub const BUYER: &str = "0:3333333333333333333333333333333333333333333333333333333333333333";
pub const ESCROW: &str = "0:4444444444444444444444444444444444444444444444444444444444444444";

pub fn intent() -> TransferIntent {
    TransferIntent::new(SELLER, MARKETPLACE, "19.99", "2.5")
}

/// A distinct, well-formed boc per `n`.
pub fn signed_boc(n: u64) -> String {
    let mut builder = CellBuilder::new();
    builder.store_uint(u128::from(n), 64).unwrap();
    serialize_boc_base64(&Arc::new(builder.build().unwrap()))
}

pub fn signed(n: u64) -> SignedTransaction {
    SignedTransaction::from_boc(&signed_boc(n)).unwrap()
}

/// Request whose deadline is `secs` from now (negative: already past).
pub fn request_valid_for(secs: i64) -> TransactionRequest {
    let mut request = TransactionRequestBuilder::new().build(&intent(), ESCROW).unwrap();
    request.valid_until = now_secs().saturating_add_signed(secs);
    request
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ConnectMode {
    Approve,
    Decline,
    Hang,
}

pub struct MockWallet {
    connect_mode: Mutex<ConnectMode>,
    approve: AtomicBool,
    never_answer: bool,
    fixed_boc: Option<String>,
    gate: Option<watch::Sender<bool>>,
    connect_calls: AtomicUsize,
    send_calls: AtomicUsize,
    last_request: Mutex<Option<TransactionRequest>>,
}

impl MockWallet {
    fn with(approve: bool) -> Self {
        Self {
            connect_mode: Mutex::new(ConnectMode::Approve),
            approve: AtomicBool::new(approve),
            never_answer: false,
            fixed_boc: None,
            gate: None,
            connect_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn approving() -> Self {
        Self::with(true)
    }

    pub fn rejecting() -> Self {
        Self::with(false)
    }

    pub fn declining_connect() -> Self {
        let wallet = Self::with(true);
        *wallet.connect_mode.lock().unwrap() = ConnectMode::Decline;
        wallet
    }

    pub fn never_answering() -> Self {
        Self {
            never_answer: true,
            ..Self::with(true)
        }
    }

    pub fn returning_boc(boc: &str) -> Self {
        Self {
            fixed_boc: Some(boc.to_string()),
            ..Self::with(true)
        }
    }

    pub fn with_connect_hang(self) -> Self {
        *self.connect_mode.lock().unwrap() = ConnectMode::Hang;
        self
    }

    /// Hold every `send_transaction` until [`open_gate`](Self::open_gate).
    pub fn with_gate(mut self) -> Self {
        self.gate = Some(watch::channel(false).0);
        self
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.send_replace(true);
        }
    }

    pub fn set_approve(&self, approve: bool) {
        self.approve.store(approve, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<TransactionRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletConnector for MockWallet {
    async fn connect(&self) -> Result<WalletAccount, WalletError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let mode = *self.connect_mode.lock().unwrap();
        match mode {
            ConnectMode::Approve => Ok(WalletAccount {
                address: BUYER.to_string(),
                chain: "-239".to_string(),
            }),
            ConnectMode::Decline => Err(WalletError::ConnectDeclined("closed modal".into())),
            ConnectMode::Hang => std::future::pending().await,
        }
    }

    async fn send_transaction(&self, request: &TransactionRequest) -> Result<String, WalletError> {
        let n = self.send_calls.fetch_add(1, Ordering::SeqCst) as u64;
        *self.last_request.lock().unwrap() = Some(request.clone());
        if let Some(gate) = &self.gate {
            let mut open = gate.subscribe();
            let _ = open.wait_for(|o| *o).await;
        }
        if self.never_answer {
            return std::future::pending().await;
        }
        if !self.approve.load(Ordering::SeqCst) {
            return Err(WalletError::Rejected("user declined".into()));
        }
        Ok(self.fixed_boc.clone().unwrap_or_else(|| signed_boc(n)))
    }
}

#[derive(Default)]
pub struct MockBackend {
    stored: Mutex<HashMap<String, PaymentRecord>>,
    submissions: Mutex<Vec<PaymentSubmission>>,
    paid: Mutex<Vec<String>>,
    create_calls: AtomicUsize,
    lose_next_create: AtomicBool,
    complete_on_create: AtomicBool,
    fail_mark_paid: AtomicBool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next create is stored, but the caller sees a timeout.
    pub fn lose_next_create_response(&self) {
        self.lose_next_create.store(true, Ordering::SeqCst);
    }

    pub fn complete_on_create(&self) {
        self.complete_on_create.store(true, Ordering::SeqCst);
    }

    pub fn fail_mark_paid(&self) {
        self.fail_mark_paid.store(true, Ordering::SeqCst);
    }

    pub fn set_status(&self, tx_hash: &str, status: PaymentStatus) {
        if let Some(record) = self.stored.lock().unwrap().get_mut(tx_hash) {
            record.status = status;
        }
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn stored_count(&self) -> usize {
        self.stored.lock().unwrap().len()
    }

    pub fn submissions(&self) -> Vec<PaymentSubmission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn paid_orders(&self) -> Vec<String> {
        self.paid.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentBackend for MockBackend {
    async fn create_payment(&self, submission: &PaymentSubmission) -> Result<PaymentRecord, Error> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.submissions.lock().unwrap().push(submission.clone());
        let status = if self.complete_on_create.load(Ordering::SeqCst) {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Pending
        };
        let record = self
            .stored
            .lock()
            .unwrap()
            .entry(submission.transaction_hash.clone())
            .or_insert_with(|| PaymentRecord {
                id: format!("pay-{n}"),
                order_id: submission.order_id.clone(),
                amount: submission.amount,
                from_address: submission.from_wallet_address.clone(),
                to_address: submission.to_wallet_address.clone(),
                transaction_hash: submission.transaction_hash.clone(),
                status,
            })
            .clone();
        if self.lose_next_create.swap(false, Ordering::SeqCst) {
            return Err(Error::Backend("operation timed out".into()));
        }
        Ok(record)
    }

    async fn find_payment(&self, tx_hash: &str) -> Result<Option<PaymentRecord>, Error> {
        Ok(self.stored.lock().unwrap().get(tx_hash).cloned())
    }

    async fn mark_order_paid(&self, order_id: &str) -> Result<(), Error> {
        if self.fail_mark_paid.load(Ordering::SeqCst) {
            return Err(Error::Backend("HTTP 500".into()));
        }
        self.paid.lock().unwrap().push(order_id.to_string());
        Ok(())
    }
}
