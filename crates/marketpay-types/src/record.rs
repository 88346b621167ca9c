//! Backend payment records and the order status shown to the buyer.

use serde::{Deserialize, Serialize};

use crate::amount::Nano;
use crate::payload::TransferPayload;
use crate::signed::SignedTransaction;

/// Backend-owned payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn is_final(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Refunded)
    }
}

/// Authoritative payment record as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: String,
    pub order_id: String,
    pub amount: Nano,
    pub from_address: String,
    pub to_address: String,
    pub transaction_hash: String,
    pub status: PaymentStatus,
}

/// Body posted to the backend for a signed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSubmission {
    pub order_id: String,
    pub amount: Nano,
    pub from_wallet_address: String,
    pub to_wallet_address: String,
    pub transaction_hash: String,
    pub gas_fee: Nano,
    pub commission: Nano,
}

impl PaymentSubmission {
    /// Amount and addresses come from the validated intent; the hash from
    /// the signed transaction. Nothing is re-derived from display values.
    pub fn new(
        order_id: impl Into<String>,
        payload: &TransferPayload,
        buyer_wallet: &str,
        signed: &SignedTransaction,
        gas_fee: Nano,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            amount: payload.amount,
            from_wallet_address: buyer_wallet.to_string(),
            to_wallet_address: payload.seller.to_string(),
            transaction_hash: signed.hash().to_string(),
            gas_fee,
            commission: payload.commission_amount(),
        }
    }
}

/// What the order page may show. There is no optimistic "confirmed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPaymentView {
    AwaitingConfirmation,
    Confirmed,
    Failed,
    Refunded,
}

impl From<PaymentStatus> for OrderPaymentView {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Pending | PaymentStatus::Processing => Self::AwaitingConfirmation,
            PaymentStatus::Completed => Self::Confirmed,
            PaymentStatus::Failed => Self::Failed,
            PaymentStatus::Refunded => Self::Refunded,
        }
    }
}

impl OrderPaymentView {
    pub fn message(self) -> &'static str {
        match self {
            Self::AwaitingConfirmation => "Payment submitted, awaiting confirmation",
            Self::Confirmed => "Payment confirmed",
            Self::Failed => "Payment failed",
            Self::Refunded => "Payment refunded",
        }
    }
}
