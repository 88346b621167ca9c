//! Outbound transaction requests in the TON Connect `sendTransaction` shape.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::amount::{Nano, to_base_units};
use crate::payload::{EncodedPayload, TransferIntent, encode};
use crate::{Address, PaymentError};

/// Wallet approval window.
pub const DEFAULT_VALIDITY_SECS: u64 = 300;
/// Gas attached on top of the price (0.05 TON).
pub const DEFAULT_GAS_RESERVE: Nano = Nano(50_000_000);

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMessage {
    pub address: String,
    pub amount: Nano,
    pub payload: EncodedPayload,
}

/// A transaction ready for wallet approval.
///
/// Serializes as `{"validUntil": .., "messages": [{"address", "amount", "payload"}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub valid_until: u64,
    pub messages: Vec<TransactionMessage>,
}

impl TransactionRequest {
    fn message(&self) -> Option<&TransactionMessage> {
        self.messages.first()
    }

    pub fn destination(&self) -> &str {
        self.message().map(|m| m.address.as_str()).unwrap_or_default()
    }

    pub fn attached_amount(&self) -> Nano {
        self.message().map(|m| m.amount).unwrap_or_default()
    }

    pub fn payload(&self) -> Option<&EncodedPayload> {
        self.message().map(|m| &m.payload)
    }

    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        self.valid_until <= now_secs
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_secs())
    }

    /// Seconds left before the request goes stale.
    pub fn remaining_secs(&self, now_secs: u64) -> u64 {
        self.valid_until.saturating_sub(now_secs)
    }
}

/// Builds [`TransactionRequest`]s with a fixed validity window and gas reserve.
#[derive(Debug, Clone, Copy)]
pub struct TransactionRequestBuilder {
    validity_secs: u64,
    gas_reserve: Nano,
}

impl Default for TransactionRequestBuilder {
    fn default() -> Self {
        Self {
            validity_secs: DEFAULT_VALIDITY_SECS,
            gas_reserve: DEFAULT_GAS_RESERVE,
        }
    }
}

impl TransactionRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validity_secs(mut self, secs: u64) -> Self {
        self.validity_secs = secs.max(1);
        self
    }

    pub fn with_gas_reserve(mut self, gas_reserve: Nano) -> Self {
        self.gas_reserve = gas_reserve;
        self
    }

    pub fn gas_reserve(&self) -> Nano {
        self.gas_reserve
    }

    pub fn build(
        &self,
        intent: &TransferIntent,
        destination_contract: &str,
    ) -> Result<TransactionRequest, PaymentError> {
        self.build_at(intent, destination_contract, now_secs())
    }

    /// [`build`](Self::build) against an explicit clock.
    pub fn build_at(
        &self,
        intent: &TransferIntent,
        destination_contract: &str,
        now_secs: u64,
    ) -> Result<TransactionRequest, PaymentError> {
        if destination_contract.trim().is_empty() {
            return Err(PaymentError::InvalidIntent("destination is empty".into()));
        }
        let destination = Address::parse(destination_contract)?;
        let amount = to_base_units(&intent.amount)?;
        if amount.is_zero() {
            return Err(PaymentError::InvalidIntent("amount must be positive".into()));
        }
        let payload = encode(intent)?;
        let attached = amount.checked_add(self.gas_reserve).ok_or_else(|| {
            PaymentError::InvalidAmount("amount plus gas reserve exceeds coin range".into())
        })?;

        Ok(TransactionRequest {
            valid_until: now_secs.saturating_add(self.validity_secs),
            messages: vec![TransactionMessage {
                address: destination.to_string(),
                amount: attached,
                payload,
            }],
        })
    }
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
