//! Exact conversion between human TON amounts and nano-units.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::PaymentError;

/// Fractional digits of one TON.
pub const NANO_DECIMALS: usize = 9;
/// Nano-units per TON.
pub const NANO_PER_TON: u128 = 1_000_000_000;
/// Largest value a `Coins` (VarUInteger 16) field can carry.
pub const MAX_COINS: u128 = (1u128 << 120) - 1;

const BPS_DENOMINATOR: u128 = 10_000;

/// Amount in nano-units. Serialized as a decimal string, like every
/// amount that crosses a JSON boundary in the wallet protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Nano(pub u128);

impl Nano {
    pub const ZERO: Nano = Nano(0);

    pub fn as_u128(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Nano) -> Option<Nano> {
        self.0
            .checked_add(other.0)
            .filter(|v| *v <= MAX_COINS)
            .map(Nano)
    }

    /// `self * bps / 10000`, rounded down. Never overflows for valid coin values.
    pub fn apply_bps(self, bps: u16) -> Nano {
        let bps = u128::from(bps);
        let whole = (self.0 / BPS_DENOMINATOR) * bps;
        let rest = (self.0 % BPS_DENOMINATOR) * bps / BPS_DENOMINATOR;
        Nano(whole + rest)
    }

    /// Human-readable decimal TON string.
    pub fn to_ton_string(self) -> String {
        from_base_units(self)
    }
}

impl std::fmt::Display for Nano {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Nano {
    type Err = PaymentError;

    /// Parses an integer nano-unit string (not a human amount).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PaymentError::InvalidAmount(format!(
                "'{s}' is not an integer nano amount"
            )));
        }
        let value: u128 = s
            .parse()
            .map_err(|_| PaymentError::InvalidAmount(format!("'{s}' exceeds coin range")))?;
        if value > MAX_COINS {
            return Err(PaymentError::InvalidAmount(format!("'{s}' exceeds coin range")));
        }
        Ok(Nano(value))
    }
}

impl Serialize for Nano {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

/// Accepts the canonical string form and, from backends that send them, plain integers.
impl<'de> Deserialize<'de> for Nano {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Int(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Repr::Int(n) => Ok(Nano(u128::from(n))),
        }
    }
}

/// Convert a human decimal amount (`"19.99"`) to nano-units.
///
/// Integer arithmetic only. Trailing fractional zeros beyond nine digits are
/// accepted; any other tenth digit would be silently lost and is rejected.
pub fn to_base_units(amount: &str) -> Result<Nano, PaymentError> {
    let s = amount.trim();
    if s.is_empty() {
        return Err(PaymentError::InvalidAmount("amount is empty".into()));
    }
    if s.starts_with('-') {
        return Err(PaymentError::InvalidAmount(format!("'{s}' is negative")));
    }
    let lowered = s.to_ascii_lowercase();
    if matches!(
        lowered.trim_start_matches('+'),
        "nan" | "inf" | "infinity"
    ) {
        return Err(PaymentError::InvalidAmount(format!("'{s}' is not finite")));
    }

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s, None),
    };
    let is_digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    if !is_digits(int_part) || frac_part.is_some_and(|f| !is_digits(f)) {
        return Err(PaymentError::InvalidAmount(format!(
            "'{s}' is not a decimal number"
        )));
    }

    let frac = frac_part.unwrap_or("").trim_end_matches('0');
    if frac.len() > NANO_DECIMALS {
        return Err(PaymentError::InvalidAmount(format!(
            "'{s}' has more than {NANO_DECIMALS} fractional digits"
        )));
    }

    let out_of_range = || PaymentError::InvalidAmount(format!("'{s}' exceeds coin range"));
    let whole: u128 = int_part.parse().map_err(|_| out_of_range())?;

    let mut frac_units: u128 = 0;
    for (i, digit) in frac.bytes().enumerate() {
        let scale = 10u128.pow((NANO_DECIMALS - 1 - i) as u32);
        frac_units += u128::from(digit - b'0') * scale;
    }

    let total = whole
        .checked_mul(NANO_PER_TON)
        .and_then(|w| w.checked_add(frac_units))
        .filter(|v| *v <= MAX_COINS)
        .ok_or_else(out_of_range)?;
    Ok(Nano(total))
}

/// Render nano-units as the canonical decimal TON amount.
pub fn from_base_units(units: Nano) -> String {
    let whole = units.0 / NANO_PER_TON;
    let frac = units.0 % NANO_PER_TON;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:09}");
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_does_not_drift() {
        assert_eq!(to_base_units("19.99").unwrap(), Nano(19_990_000_000));
        assert_eq!(to_base_units("0.1").unwrap(), Nano(100_000_000));
        assert_eq!(to_base_units("0.000000001").unwrap(), Nano(1));
        assert_eq!(to_base_units("1").unwrap(), Nano(1_000_000_000));
        assert_eq!(to_base_units("007.50").unwrap(), Nano(7_500_000_000));
    }

    #[test]
    fn test_round_trip_exact() {
        for a in ["19.99", "0.000000001", "123456789.123456789", "5", "0.5", "1000000"] {
            assert_eq!(from_base_units(to_base_units(a).unwrap()), a, "amount {a}");
        }
    }

    #[test]
    fn test_round_trip_canonicalizes() {
        assert_eq!(from_base_units(to_base_units("1.500").unwrap()), "1.5");
        assert_eq!(from_base_units(to_base_units("0").unwrap()), "0");
        assert_eq!(from_base_units(to_base_units("2.0000000000").unwrap()), "2");
    }

    #[test]
    fn test_rejects_negative_and_non_finite() {
        for bad in ["-1", "-0.5", "NaN", "inf", "+Infinity", "", "  "] {
            assert!(
                matches!(to_base_units(bad), Err(PaymentError::InvalidAmount(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["1.2.3", "1e9", ".5", "5.", "1,5", "0x10", "12 3"] {
            assert!(to_base_units(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_rejects_lost_precision() {
        assert!(to_base_units("0.0000000001").is_err());
        assert!(to_base_units("1.1234567891").is_err());
    }

    #[test]
    fn test_rejects_beyond_coin_range() {
        let max_ton = MAX_COINS / NANO_PER_TON;
        assert!(to_base_units(&max_ton.to_string()).is_ok());
        assert!(to_base_units(&(max_ton + 1).to_string()).is_err());
        assert!(to_base_units("999999999999999999999999999999999999999999").is_err());
    }

    #[test]
    fn test_apply_bps() {
        let amount = to_base_units("19.99").unwrap();
        assert_eq!(amount.apply_bps(250), Nano(499_750_000));
        assert_eq!(amount.apply_bps(0), Nano::ZERO);
        assert_eq!(Nano(MAX_COINS).apply_bps(10_000), Nano(MAX_COINS));
        assert_eq!(Nano(3).apply_bps(5_000), Nano(1));
    }

    #[test]
    fn test_nano_json_is_string() {
        let json = serde_json::to_string(&Nano(19_990_000_000)).unwrap();
        assert_eq!(json, "\"19990000000\"");
        let back: Nano = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Nano(19_990_000_000));
        assert!(serde_json::from_str::<Nano>("\"1.5\"").is_err());
        assert_eq!(serde_json::from_str::<Nano>("50000000").unwrap(), Nano(50_000_000));
        assert!(serde_json::from_str::<Nano>("-1").is_err());
    }
}
