//! Wallet submission state machine.
//!
//! Connection: `Disconnected -> Connecting -> Connected`.
//! Submission (while connected): `Idle -> AwaitingSignature -> Signed | Rejected | Expired`.
//! Every transition is published on a watch channel; UI layers subscribe
//! instead of owning the protocol.

use async_trait::async_trait;
use marketpay_types::{now_secs, PaymentError, SignedTransaction, TransactionRequest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::metrics::METRICS;

/// Account exposed by a connected wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletAccount {
    /// User-friendly address.
    pub address: String,
    /// TON Connect chain id: `-239` mainnet, `-3` testnet.
    pub chain: String,
}

/// Errors reported by a wallet implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// The user closed or refused the connect prompt.
    ConnectDeclined(String),
    /// The user declined the transaction.
    Rejected(String),
    /// Bridge or wallet app unreachable.
    Unavailable(String),
}

impl std::fmt::Display for WalletError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectDeclined(msg) => write!(f, "connect declined: {msg}"),
            Self::Rejected(msg) => write!(f, "rejected: {msg}"),
            Self::Unavailable(msg) => write!(f, "wallet unavailable: {msg}"),
        }
    }
}

impl std::error::Error for WalletError {}

/// Wallet transport (TON Connect bridge, injected provider, test double).
///
/// Only [`WalletSubmissionClient`] calls into it.
#[async_trait]
pub trait WalletConnector: Send + Sync {
    /// Show the connect prompt and wait for the user's choice.
    async fn connect(&self) -> Result<WalletAccount, WalletError>;

    /// Ask the wallet to sign and send; returns the signed message boc (base64).
    async fn send_transaction(&self, request: &TransactionRequest) -> Result<String, WalletError>;

    async fn disconnect(&self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected(WalletAccount),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    AwaitingSignature { valid_until: u64 },
    Signed { hash: String },
    Rejected { reason: String },
    Expired { valid_until: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletState {
    pub connection: ConnectionState,
    pub submission: SubmissionState,
}

impl Default for WalletState {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            submission: SubmissionState::Idle,
        }
    }
}

/// Drives connect / send / await-signature for one user session.
pub struct WalletSubmissionClient {
    connector: Arc<dyn WalletConnector>,
    connect_timeout: Duration,
    state: watch::Sender<WalletState>,
    in_flight: AtomicBool,
}

impl WalletSubmissionClient {
    pub fn new(connector: Arc<dyn WalletConnector>, connect_timeout: Duration) -> Self {
        let (state, _) = watch::channel(WalletState::default());
        Self {
            connector,
            connect_timeout,
            state,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<WalletState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> WalletState {
        self.state.borrow().clone()
    }

    pub fn account(&self) -> Option<WalletAccount> {
        match &self.state.borrow().connection {
            ConnectionState::Connected(account) => Some(account.clone()),
            _ => None,
        }
    }

    /// Connect if needed. Decline or timeout ends in `WalletNotConnected`; no retry.
    pub async fn ensure_connected(&self) -> Result<WalletAccount, PaymentError> {
        if let Some(account) = self.account() {
            return Ok(account);
        }

        self.set_connection(ConnectionState::Connecting);
        match tokio::time::timeout(self.connect_timeout, self.connector.connect()).await {
            Ok(Ok(account)) => {
                info!(address = %account.address, chain = %account.chain, "Wallet connected");
                self.state.send_modify(|s| {
                    s.connection = ConnectionState::Connected(account.clone());
                    s.submission = SubmissionState::Idle;
                });
                Ok(account)
            }
            Ok(Err(e)) => {
                METRICS
                    .wallet_connect_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Wallet connect failed");
                self.set_connection(ConnectionState::Disconnected);
                Err(PaymentError::WalletNotConnected)
            }
            Err(_) => {
                METRICS
                    .wallet_connect_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    timeout_secs = self.connect_timeout.as_secs(),
                    "Wallet connect timed out"
                );
                self.set_connection(ConnectionState::Disconnected);
                Err(PaymentError::WalletNotConnected)
            }
        }
    }

    pub async fn disconnect(&self) {
        self.connector.disconnect().await;
        self.state.send_modify(|s| {
            s.connection = ConnectionState::Disconnected;
            s.submission = SubmissionState::Idle;
        });
        info!("Wallet disconnected");
    }

    /// Submit a request and wait for the wallet's answer.
    ///
    /// A second call while one is awaiting signature fails with
    /// `SubmissionInProgress`. A stale request is never sent.
    pub async fn submit(&self, request: &TransactionRequest) -> Result<SignedTransaction, PaymentError> {
        let _guard = SubmissionGuard::acquire(self)?;
        self.ensure_connected().await?;

        let now = now_secs();
        if request.is_expired_at(now) {
            return Err(self.expire(request.valid_until));
        }

        self.set_submission(SubmissionState::AwaitingSignature {
            valid_until: request.valid_until,
        });
        info!(
            destination = %request.destination(),
            amount = %request.attached_amount(),
            valid_until = request.valid_until,
            "Awaiting wallet signature"
        );

        let window = Duration::from_secs(request.remaining_secs(now));
        let boc = match tokio::time::timeout(window, self.connector.send_transaction(request)).await {
            Ok(Ok(boc)) => boc,
            Ok(Err(e)) => return Err(self.reject(e.to_string())),
            Err(_) => return Err(self.expire(request.valid_until)),
        };

        match SignedTransaction::from_boc(&boc) {
            Ok(signed) => {
                METRICS.wallet_signed.fetch_add(1, Ordering::Relaxed);
                info!(tx_hash = %signed.hash(), "Transaction signed");
                self.set_submission(SubmissionState::Signed {
                    hash: signed.hash().to_string(),
                });
                Ok(signed)
            }
            Err(e) => Err(self.reject(format!("wallet returned an unreadable boc: {e}"))),
        }
    }

    fn reject(&self, reason: String) -> PaymentError {
        METRICS.wallet_rejections.fetch_add(1, Ordering::Relaxed);
        warn!(reason = %reason, "Wallet rejected transaction");
        self.set_submission(SubmissionState::Rejected {
            reason: reason.clone(),
        });
        PaymentError::SubmissionRejected(reason)
    }

    fn expire(&self, valid_until: u64) -> PaymentError {
        METRICS.wallet_expiries.fetch_add(1, Ordering::Relaxed);
        warn!(valid_until, "Transaction request expired");
        self.set_submission(SubmissionState::Expired { valid_until });
        PaymentError::SubmissionExpired { valid_until }
    }

    fn set_connection(&self, connection: ConnectionState) {
        self.state.send_modify(|s| s.connection = connection);
    }

    fn set_submission(&self, submission: SubmissionState) {
        self.state.send_modify(|s| s.submission = submission);
    }
}

/// RAII claim on the single submission slot. Releases on drop, including
/// when the submit future is dropped mid-signature.
struct SubmissionGuard<'a> {
    client: &'a WalletSubmissionClient,
}

impl<'a> SubmissionGuard<'a> {
    fn acquire(client: &'a WalletSubmissionClient) -> Result<Self, PaymentError> {
        if client
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Submission attempted while another awaits signature");
            return Err(PaymentError::SubmissionInProgress);
        }
        Ok(Self { client })
    }
}

impl Drop for SubmissionGuard<'_> {
    fn drop(&mut self) {
        self.client.state.send_if_modified(|s| {
            if matches!(s.submission, SubmissionState::AwaitingSignature { .. }) {
                s.submission = SubmissionState::Idle;
                true
            } else {
                false
            }
        });
        self.client.in_flight.store(false, Ordering::Release);
    }
}
