//! Request and response bodies for the gateway API.

use marketpay_types::{OrderPaymentView, PaymentRecord, TransactionRequest, TransferIntent};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareRequest {
    pub order_id: String,
    pub intent: TransferIntent,
}

/// `transaction` is passed to the wallet's `sendTransaction` unchanged.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareResponse {
    pub success: bool,
    pub order_id: String,
    pub transaction: TransactionRequest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub order_id: String,
    pub intent: TransferIntent,
    /// Signed message boc returned by the wallet.
    pub boc: String,
    pub buyer_wallet: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub success: bool,
    pub record: PaymentRecord,
    pub view: OrderPaymentView,
    pub message: &'static str,
}

impl PaymentResponse {
    pub fn new(record: PaymentRecord) -> Self {
        let view = OrderPaymentView::from(record.status);
        Self {
            success: true,
            record,
            view,
            message: view.message(),
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub escrow_address: String,
    pub backend_url: String,
    pub backend_status: &'static str,
    pub uptime_secs: u64,
    pub requests: u64,
    pub cached_records: usize,
}
