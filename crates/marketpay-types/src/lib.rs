//! Shared types and pure-logic utilities for marketplace TON payments.
//! No network or wallet dependency; everything here is deterministic.

mod address;
mod amount;
pub mod boc;
pub mod cell;
mod checksum;
mod error;
mod payload;
mod record;
mod request;
mod signed;

pub use address::{Address, FriendlyFlags};
pub use amount::{MAX_COINS, NANO_PER_TON, Nano, from_base_units, to_base_units};
pub use error::PaymentError;
pub use payload::{Commission, EncodedPayload, TransferIntent, TransferPayload, encode};
pub use record::{OrderPaymentView, PaymentRecord, PaymentStatus, PaymentSubmission};
pub use request::{
    DEFAULT_GAS_RESERVE, DEFAULT_VALIDITY_SECS, TransactionMessage, TransactionRequest,
    TransactionRequestBuilder, now_secs,
};
pub use signed::SignedTransaction;
