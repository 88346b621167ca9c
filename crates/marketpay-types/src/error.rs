/// Payment flow error.
///
/// Validation variants (`InvalidAmount`, `InvalidAddress`,
/// `CommissionOutOfRange`, `InvalidIntent`, `InvalidBoc`) need corrected
/// input. Wallet variants are retried by building a fresh request. A
/// `BackendRecordFailed` is retried with the same signed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    InvalidAmount(String),
    InvalidAddress(String),
    CommissionOutOfRange(i64),
    InvalidIntent(String),
    InvalidBoc(String),
    WalletNotConnected,
    SubmissionInProgress,
    SubmissionRejected(String),
    SubmissionExpired { valid_until: u64 },
    BackendRecordFailed(String),
}

impl PaymentError {
    /// Short machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidAddress(_) => "invalid_address",
            Self::CommissionOutOfRange(_) => "commission_out_of_range",
            Self::InvalidIntent(_) => "invalid_intent",
            Self::InvalidBoc(_) => "invalid_boc",
            Self::WalletNotConnected => "wallet_not_connected",
            Self::SubmissionInProgress => "submission_in_progress",
            Self::SubmissionRejected(_) => "submission_rejected",
            Self::SubmissionExpired { .. } => "submission_expired",
            Self::BackendRecordFailed(_) => "backend_record_failed",
        }
    }

    /// Whether the same user intent may be attempted again without editing it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::WalletNotConnected
                | Self::SubmissionInProgress
                | Self::SubmissionRejected(_)
                | Self::SubmissionExpired { .. }
                | Self::BackendRecordFailed(_)
        )
    }

    /// Validation failure on user or caller input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount(_)
                | Self::InvalidAddress(_)
                | Self::CommissionOutOfRange(_)
                | Self::InvalidIntent(_)
                | Self::InvalidBoc(_)
        )
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAmount(msg) => write!(f, "invalid amount: {msg}"),
            Self::InvalidAddress(msg) => write!(f, "invalid address: {msg}"),
            Self::CommissionOutOfRange(bps) => {
                write!(f, "commission out of range: {bps} bps (expected 0..=65535)")
            }
            Self::InvalidIntent(msg) => write!(f, "invalid intent: {msg}"),
            Self::InvalidBoc(msg) => write!(f, "invalid bag of cells: {msg}"),
            Self::WalletNotConnected => write!(f, "wallet not connected"),
            Self::SubmissionInProgress => write!(f, "another submission is awaiting signature"),
            Self::SubmissionRejected(msg) => write!(f, "submission rejected: {msg}"),
            Self::SubmissionExpired { valid_until } => {
                write!(f, "submission expired (valid until {valid_until})")
            }
            Self::BackendRecordFailed(msg) => write!(f, "backend record failed: {msg}"),
        }
    }
}

impl std::error::Error for PaymentError {}
