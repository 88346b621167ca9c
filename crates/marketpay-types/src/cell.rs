//! Ordinary TON cells: builder, reader and representation hash.

use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::{Address, MAX_COINS, PaymentError};

pub const MAX_CELL_BITS: usize = 1023;
pub const MAX_CELL_REFS: usize = 4;

/// Errors raised while building, reading or (de)serializing cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellError {
    BitOverflow { needed: usize },
    RefOverflow,
    ValueTooWide { value: u128, bits: usize },
    Underflow { needed: usize, left: usize },
    Malformed(String),
}

impl std::fmt::Display for CellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BitOverflow { needed } => {
                write!(f, "cell overflow: {needed} bits exceed {MAX_CELL_BITS}")
            }
            Self::RefOverflow => write!(f, "cell overflow: more than {MAX_CELL_REFS} refs"),
            Self::ValueTooWide { value, bits } => write!(f, "{value} does not fit in {bits} bits"),
            Self::Underflow { needed, left } => {
                write!(f, "cell underflow: need {needed} bits, {left} left")
            }
            Self::Malformed(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CellError {}

impl From<CellError> for PaymentError {
    fn from(e: CellError) -> Self {
        PaymentError::InvalidBoc(e.to_string())
    }
}

/// Immutable ordinary cell. The representation hash is computed once at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
    depth: u16,
    hash: [u8; 32],
}

impl Cell {
    pub(crate) fn new(
        mut data: Vec<u8>,
        bit_len: usize,
        refs: Vec<Arc<Cell>>,
    ) -> Result<Self, CellError> {
        if bit_len > MAX_CELL_BITS {
            return Err(CellError::BitOverflow { needed: bit_len });
        }
        if refs.len() > MAX_CELL_REFS {
            return Err(CellError::RefOverflow);
        }
        let len = bit_len.div_ceil(8);
        if data.len() < len {
            return Err(CellError::Malformed(format!(
                "{} data bytes cannot hold {bit_len} bits",
                data.len()
            )));
        }
        // Trailing bits past bit_len are zeroed so equal cells compare equal.
        data.truncate(len);
        let rem = bit_len % 8;
        if rem != 0 {
            data[len - 1] &= 0xFFu8 << (8 - rem);
        }
        let depth = refs
            .iter()
            .map(|r| r.depth + 1)
            .max()
            .unwrap_or(0);
        let mut cell = Self {
            data,
            bit_len,
            refs,
            depth,
            hash: [0u8; 32],
        };
        cell.hash = cell.compute_hash();
        Ok(cell)
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn refs(&self) -> &[Arc<Cell>] {
        &self.refs
    }

    pub fn depth(&self) -> u16 {
        self.depth
    }

    /// Representation hash.
    pub fn hash(&self) -> [u8; 32] {
        self.hash
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    pub fn parser(&self) -> CellSlice<'_> {
        CellSlice {
            cell: self,
            pos: 0,
            next_ref: 0,
        }
    }

    /// Refs descriptor byte (d1). Ordinary cells only: level 0, not exotic.
    pub(crate) fn d1(&self) -> u8 {
        self.refs.len() as u8
    }

    /// Bits descriptor byte (d2): `floor(b/8) + ceil(b/8)`.
    pub(crate) fn d2(&self) -> u8 {
        ((self.bit_len / 8) + self.bit_len.div_ceil(8)) as u8
    }

    /// Data bytes with the completion tag appended when not byte-aligned.
    pub(crate) fn padded_data(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        let rem = self.bit_len % 8;
        if rem != 0 {
            let last = out.len() - 1;
            out[last] |= 1u8 << (7 - rem);
        }
        out
    }

    fn compute_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update([self.d1(), self.d2()]);
        hasher.update(self.padded_data());
        for r in &self.refs {
            hasher.update(r.depth.to_be_bytes());
        }
        for r in &self.refs {
            hasher.update(r.hash);
        }
        hasher.finalize().into()
    }
}

/// Append-only bit writer producing a [`Cell`].
#[derive(Debug, Default, Clone)]
pub struct CellBuilder {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Arc<Cell>>,
}

impl CellBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bits_left(&self) -> usize {
        MAX_CELL_BITS - self.bit_len
    }

    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self, CellError> {
        if self.bit_len >= MAX_CELL_BITS {
            return Err(CellError::BitOverflow {
                needed: self.bit_len + 1,
            });
        }
        if self.bit_len % 8 == 0 {
            self.data.push(0);
        }
        if bit {
            let idx = self.bit_len / 8;
            self.data[idx] |= 0x80 >> (self.bit_len % 8);
        }
        self.bit_len += 1;
        Ok(self)
    }

    /// Big-endian unsigned integer of `bits` width (at most 128).
    pub fn store_uint(&mut self, value: u128, bits: usize) -> Result<&mut Self, CellError> {
        if bits > 128 || (bits < 128 && value >> bits != 0) {
            return Err(CellError::ValueTooWide { value, bits });
        }
        if self.bit_len + bits > MAX_CELL_BITS {
            return Err(CellError::BitOverflow {
                needed: self.bit_len + bits,
            });
        }
        for i in (0..bits).rev() {
            self.store_bit((value >> i) & 1 == 1)?;
        }
        Ok(self)
    }

    pub fn store_u16(&mut self, value: u16) -> Result<&mut Self, CellError> {
        self.store_uint(u128::from(value), 16)
    }

    pub fn store_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self, CellError> {
        if self.bit_len + bytes.len() * 8 > MAX_CELL_BITS {
            return Err(CellError::BitOverflow {
                needed: self.bit_len + bytes.len() * 8,
            });
        }
        for &b in bytes {
            self.store_uint(u128::from(b), 8)?;
        }
        Ok(self)
    }

    /// `addr_std$10 anycast:nothing$0 workchain_id:int8 address:bits256`.
    pub fn store_address(&mut self, addr: &Address) -> Result<&mut Self, CellError> {
        self.store_uint(0b100, 3)?
            .store_uint(u128::from(addr.workchain as u8), 8)?
            .store_bytes(&addr.hash)
    }

    /// `Coins` (VarUInteger 16): 4-bit byte length, then the value.
    pub fn store_coins(&mut self, value: u128) -> Result<&mut Self, CellError> {
        if value > MAX_COINS {
            return Err(CellError::ValueTooWide { value, bits: 120 });
        }
        let len = (128 - value.leading_zeros() as usize).div_ceil(8);
        self.store_uint(len as u128, 4)?;
        if len > 0 {
            self.store_uint(value, len * 8)?;
        }
        Ok(self)
    }

    pub fn store_ref(&mut self, cell: Arc<Cell>) -> Result<&mut Self, CellError> {
        if self.refs.len() >= MAX_CELL_REFS {
            return Err(CellError::RefOverflow);
        }
        self.refs.push(cell);
        Ok(self)
    }

    pub fn build(&self) -> Result<Cell, CellError> {
        Cell::new(self.data.clone(), self.bit_len, self.refs.clone())
    }
}

/// Sequential reader over a cell's bits and refs.
pub struct CellSlice<'a> {
    cell: &'a Cell,
    pos: usize,
    next_ref: usize,
}

impl CellSlice<'_> {
    pub fn bits_left(&self) -> usize {
        self.cell.bit_len - self.pos
    }

    pub fn load_bit(&mut self) -> Result<bool, CellError> {
        if self.pos >= self.cell.bit_len {
            return Err(CellError::Underflow { needed: 1, left: 0 });
        }
        let bit = self.cell.data[self.pos / 8] & (0x80 >> (self.pos % 8)) != 0;
        self.pos += 1;
        Ok(bit)
    }

    pub fn load_uint(&mut self, bits: usize) -> Result<u128, CellError> {
        if bits > 128 {
            return Err(CellError::Malformed(format!("cannot load {bits}-bit integer")));
        }
        if bits > self.bits_left() {
            return Err(CellError::Underflow {
                needed: bits,
                left: self.bits_left(),
            });
        }
        let mut value: u128 = 0;
        for _ in 0..bits {
            value = (value << 1) | u128::from(self.load_bit()?);
        }
        Ok(value)
    }

    pub fn load_address(&mut self) -> Result<Address, CellError> {
        let prefix = self.load_uint(3)?;
        if prefix != 0b100 {
            return Err(CellError::Malformed(format!(
                "expected addr_std without anycast, got prefix {prefix:03b}"
            )));
        }
        let workchain = self.load_uint(8)? as u8 as i8;
        let mut hash = [0u8; 32];
        for b in hash.iter_mut() {
            *b = self.load_uint(8)? as u8;
        }
        Ok(Address::new(workchain, hash))
    }

    pub fn load_coins(&mut self) -> Result<u128, CellError> {
        let len = self.load_uint(4)? as usize;
        self.load_uint(len * 8)
    }

    pub fn load_ref(&mut self) -> Result<&Arc<Cell>, CellError> {
        let r = self
            .cell
            .refs
            .get(self.next_ref)
            .ok_or_else(|| CellError::Malformed("no more refs".into()))?;
        self.next_ref += 1;
        Ok(r)
    }
}
