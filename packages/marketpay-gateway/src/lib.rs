//! # Marketpay Gateway
//!
//! Payment flow for marketplace orders settled in TON: builds wallet
//! transaction requests for an escrow contract, drives wallet submission,
//! and records signed payments with the marketplace backend.
//!
//! ## Quick Start
//! ```bash
//! MARKETPAY_BACKEND_URL=http://localhost:8080/api cargo run --bin marketpay-gateway
//! ```
//!
//! ## Endpoints
//! - `POST /payments/prepare` - TON Connect request for an order
//! - `POST /payments/confirm` - Record a wallet-signed payment
//! - `GET /payments/{tx_hash}` - Authoritative payment record
//! - `GET /health`, `GET /ready`, `GET /metrics`

pub mod backend;
pub mod config;
mod error;
pub mod flow;
mod handlers;
pub mod metrics;
mod middleware;
pub mod recorder;
mod response;
mod router;
mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod wallet;

pub use backend::{HttpBackend, PaymentBackend};
pub use config::Config;
pub use error::Error;
pub use flow::{FlowStage, PageView, PaymentFlow, PaymentOutcome};
pub use recorder::PaymentRecorder;
pub use router::create as create_router;
pub use state::AppState;
pub use wallet::{
    ConnectionState, SubmissionState, WalletAccount, WalletConnector, WalletError, WalletState,
    WalletSubmissionClient,
};
