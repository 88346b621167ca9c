//! Marketplace transfer payload: the cell the escrow contract expects.
//!
//! Cell layout, in this exact order:
//! `seller:MsgAddressInt marketplace:MsgAddressInt amount:Coins commission_bps:uint16`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::amount::{Nano, to_base_units};
use crate::boc::{deserialize_boc_base64, serialize_boc_base64};
use crate::cell::{Cell, CellBuilder};
use crate::{Address, PaymentError};

/// Basis points per percent.
pub const BPS_PER_PERCENT: i64 = 100;
/// Fractional percent digits representable in basis points.
const PERCENT_DECIMALS: usize = 2;

/// Commission in basis points (1 bps = 0.01 %), encoded on the wire as `uint16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Commission(u16);

impl Commission {
    pub fn from_bps(bps: i64) -> Result<Self, PaymentError> {
        u16::try_from(bps)
            .map(Commission)
            .map_err(|_| PaymentError::CommissionOutOfRange(bps))
    }

    /// Parse a percent string (`"2.5"` -> 250 bps).
    pub fn from_percent(percent: &str) -> Result<Self, PaymentError> {
        let s = percent.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let invalid = || PaymentError::InvalidIntent(format!("'{s}' is not a commission percent"));

        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_part.is_empty()
            || !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
            || (digits.contains('.') && frac_part.is_empty())
        {
            return Err(invalid());
        }
        let frac = frac_part.trim_end_matches('0');
        if frac.len() > PERCENT_DECIMALS {
            return Err(PaymentError::InvalidIntent(format!(
                "commission '{s}' is finer than one basis point"
            )));
        }

        // Saturate: anything this large is out of range anyway.
        let whole: i64 = int_part.parse().unwrap_or(i64::MAX / (BPS_PER_PERCENT * 2));
        let frac_bps: i64 = format!("{frac:0<width$}", width = PERCENT_DECIMALS)
            .parse()
            .map_err(|_| invalid())?;
        let magnitude = whole.saturating_mul(BPS_PER_PERCENT).saturating_add(frac_bps);
        Self::from_bps(if negative { -magnitude } else { magnitude })
    }

    pub fn bps(self) -> u16 {
        self.0
    }

    /// Percent rendering, e.g. `"2.5"`.
    pub fn to_percent_string(self) -> String {
        let whole = self.0 / 100;
        let frac = self.0 % 100;
        if frac == 0 {
            whole.to_string()
        } else {
            let frac = format!("{frac:02}");
            format!("{whole}.{}", frac.trim_end_matches('0'))
        }
    }
}

/// A buyer's request to pay a seller through the marketplace.
///
/// Fields are kept as entered; validation happens in [`encode`] so that every
/// caller gets the same error for the same input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferIntent {
    pub seller_address: String,
    pub marketplace_address: String,
    /// Human TON amount, e.g. `"19.99"`.
    pub amount: String,
    /// Percent, e.g. `"2.5"`.
    pub commission_percent: String,
}

impl TransferIntent {
    pub fn new(
        seller_address: impl Into<String>,
        marketplace_address: impl Into<String>,
        amount: impl Into<String>,
        commission_percent: impl Into<String>,
    ) -> Self {
        Self {
            seller_address: seller_address.into(),
            marketplace_address: marketplace_address.into(),
            amount: amount.into(),
            commission_percent: commission_percent.into(),
        }
    }

    /// Validate every field in wire order without building the cell.
    pub fn validate(&self) -> Result<TransferPayload, PaymentError> {
        let seller = Address::parse(&self.seller_address)?;
        let marketplace = Address::parse(&self.marketplace_address)?;
        let amount = to_base_units(&self.amount)?;
        let commission = Commission::from_percent(&self.commission_percent)?;
        Ok(TransferPayload {
            seller,
            marketplace,
            amount,
            commission,
        })
    }
}

/// Validated payload fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPayload {
    pub seller: Address,
    pub marketplace: Address,
    pub amount: Nano,
    pub commission: Commission,
}

impl TransferPayload {
    pub fn to_cell(&self) -> Result<Cell, PaymentError> {
        let mut b = CellBuilder::new();
        b.store_address(&self.seller)?
            .store_address(&self.marketplace)?
            .store_coins(self.amount.as_u128())?
            .store_u16(self.commission.bps())?;
        Ok(b.build()?)
    }

    pub fn from_cell(cell: &Cell) -> Result<Self, PaymentError> {
        let mut s = cell.parser();
        let seller = s.load_address()?;
        let marketplace = s.load_address()?;
        let amount = Nano(s.load_coins()?);
        let commission = Commission(s.load_uint(16)? as u16);
        if s.bits_left() != 0 {
            return Err(PaymentError::InvalidBoc(format!(
                "{} trailing bits after payload",
                s.bits_left()
            )));
        }
        Ok(Self {
            seller,
            marketplace,
            amount,
            commission,
        })
    }

    /// Commission share of the amount, in nano-units.
    pub fn commission_amount(&self) -> Nano {
        self.amount.apply_bps(self.commission.bps())
    }
}

/// Base64 bag-of-cells holding one payload cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedPayload(String);

impl EncodedPayload {
    pub fn as_base64(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn decode(&self) -> Result<TransferPayload, PaymentError> {
        let cell = deserialize_boc_base64(&self.0)?;
        TransferPayload::from_cell(&cell)
    }
}

impl std::fmt::Display for EncodedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encode an intent into the payload the escrow contract consumes.
///
/// Pure and deterministic: identical intents give identical bytes.
pub fn encode(intent: &TransferIntent) -> Result<EncodedPayload, PaymentError> {
    let payload = intent.validate()?;
    let cell = Arc::new(payload.to_cell()?);
    Ok(EncodedPayload(serialize_boc_base64(&cell)))
}
