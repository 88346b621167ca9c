//! TON account addresses: raw (`0:<hex>`) and user-friendly (48-char base64) forms.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::PaymentError;
use crate::checksum::crc16_xmodem;

const FRIENDLY_LEN: usize = 48;
const TAG_BOUNCEABLE: u8 = 0x11;
const TAG_NON_BOUNCEABLE: u8 = 0x51;
const TAG_TESTNET: u8 = 0x80;

/// Standard internal address (`addr_std` without anycast).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub workchain: i8,
    pub hash: [u8; 32],
}

/// Flags carried by the user-friendly form. Not part of the on-chain identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FriendlyFlags {
    pub bounceable: bool,
    pub testnet: bool,
}

impl Address {
    pub fn new(workchain: i8, hash: [u8; 32]) -> Self {
        Self { workchain, hash }
    }

    /// Parse either form; user-friendly flags are discarded.
    pub fn parse(input: &str) -> Result<Self, PaymentError> {
        Self::parse_with_flags(input).map(|(addr, _)| addr)
    }

    pub fn parse_with_flags(input: &str) -> Result<(Self, FriendlyFlags), PaymentError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(PaymentError::InvalidAddress("address is empty".into()));
        }
        if s.contains(':') {
            let addr = parse_raw(s)?;
            return Ok((addr, FriendlyFlags { bounceable: true, testnet: false }));
        }
        parse_friendly(s)
    }

    /// `workchain:hex` form.
    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash))
    }

    pub fn to_friendly(&self, flags: FriendlyFlags, url_safe: bool) -> String {
        let mut bytes = [0u8; 36];
        let mut tag = if flags.bounceable {
            TAG_BOUNCEABLE
        } else {
            TAG_NON_BOUNCEABLE
        };
        if flags.testnet {
            tag |= TAG_TESTNET;
        }
        bytes[0] = tag;
        bytes[1] = self.workchain as u8;
        bytes[2..34].copy_from_slice(&self.hash);
        let crc = crc16_xmodem(&bytes[..34]);
        bytes[34..].copy_from_slice(&crc.to_be_bytes());
        if url_safe {
            URL_SAFE.encode(bytes)
        } else {
            STANDARD.encode(bytes)
        }
    }
}

impl std::fmt::Display for Address {
    /// Bounceable, mainnet, url-safe: the form wallets display.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_friendly(
            FriendlyFlags {
                bounceable: true,
                testnet: false,
            },
            true,
        ))
    }
}

impl std::str::FromStr for Address {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

fn parse_raw(s: &str) -> Result<Address, PaymentError> {
    let (wc, hash_hex) = s
        .split_once(':')
        .ok_or_else(|| PaymentError::InvalidAddress(format!("'{s}' is not a raw address")))?;
    let workchain: i8 = wc
        .parse()
        .map_err(|_| PaymentError::InvalidAddress(format!("invalid workchain '{wc}'")))?;
    if hash_hex.len() != 64 {
        return Err(PaymentError::InvalidAddress(format!(
            "account id must be 64 hex chars, got {}",
            hash_hex.len()
        )));
    }
    let mut hash = [0u8; 32];
    hex::decode_to_slice(hash_hex, &mut hash)
        .map_err(|e| PaymentError::InvalidAddress(format!("invalid account id hex: {e}")))?;
    Ok(Address { workchain, hash })
}

fn parse_friendly(s: &str) -> Result<(Address, FriendlyFlags), PaymentError> {
    if s.len() != FRIENDLY_LEN {
        return Err(PaymentError::InvalidAddress(format!(
            "'{s}' is neither raw nor a {FRIENDLY_LEN}-char friendly address"
        )));
    }
    let engine = if s.contains(['-', '_']) { &URL_SAFE } else { &STANDARD };
    let bytes = engine
        .decode(s)
        .map_err(|e| PaymentError::InvalidAddress(format!("invalid base64: {e}")))?;
    if bytes.len() != 36 {
        return Err(PaymentError::InvalidAddress(format!(
            "decoded friendly address must be 36 bytes, got {}",
            bytes.len()
        )));
    }

    let expected = crc16_xmodem(&bytes[..34]);
    let actual = u16::from_be_bytes([bytes[34], bytes[35]]);
    if expected != actual {
        return Err(PaymentError::InvalidAddress("checksum mismatch".into()));
    }

    let tag = bytes[0];
    let testnet = tag & TAG_TESTNET != 0;
    let bounceable = match tag & !TAG_TESTNET {
        TAG_BOUNCEABLE => true,
        TAG_NON_BOUNCEABLE => false,
        other => {
            return Err(PaymentError::InvalidAddress(format!(
                "unknown address tag 0x{other:02x}"
            )));
        }
    };

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes[2..34]);
    Ok((
        Address {
            workchain: bytes[1] as i8,
            hash,
        },
        FriendlyFlags { bounceable, testnet },
    ))
}
