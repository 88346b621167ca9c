//! Wallet-signed transactions and their locally computed hash.

use serde::Serialize;

use crate::PaymentError;
use crate::boc::deserialize_boc_base64;

/// Signed external message returned by the wallet.
///
/// Only constructible from the boc: the hash is always the representation
/// hash of the decoded root cell, never a value supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedTransaction {
    boc: String,
    hash: String,
}

impl SignedTransaction {
    pub fn from_boc(boc: &str) -> Result<Self, PaymentError> {
        let boc = boc.trim();
        if boc.is_empty() {
            return Err(PaymentError::InvalidBoc("empty boc".into()));
        }
        let root = deserialize_boc_base64(boc)?;
        Ok(Self {
            boc: boc.to_string(),
            hash: root.hash_hex(),
        })
    }

    pub fn boc(&self) -> &str {
        &self.boc
    }

    /// Lowercase hex representation hash of the root cell.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}
