//! Bag-of-cells (BoC) serialization, single root.
//!
//! Layout: `b5ee9c72 | flags+size | off_bytes | cells | roots | absent |
//! tot_cells_size | root_list | [index] | cell_data | [crc32c]`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cell::{Cell, CellError};
use crate::checksum::crc32c;

const BOC_MAGIC: [u8; 4] = [0xb5, 0xee, 0x9c, 0x72];
const FLAG_HAS_INDEX: u8 = 0x80;
const FLAG_HAS_CRC32C: u8 = 0x40;
/// Deepest ref chain accepted from the wire.
const MAX_CELL_DEPTH: usize = 1024;

/// Serialize `root` and everything it references.
pub fn serialize_boc(root: &Arc<Cell>, with_crc: bool) -> Vec<u8> {
    let order = topological_order(root);
    let index: HashMap<[u8; 32], usize> = order
        .iter()
        .enumerate()
        .map(|(i, c)| (c.hash(), i))
        .collect();

    let size_bytes = bytes_for(order.len() as u64);
    let mut cell_data = Vec::new();
    for cell in &order {
        cell_data.push(cell.d1());
        cell_data.push(cell.d2());
        cell_data.extend_from_slice(&cell.padded_data());
        for r in cell.refs() {
            let idx = index[&r.hash()] as u64;
            cell_data.extend_from_slice(&idx.to_be_bytes()[8 - size_bytes..]);
        }
    }
    let off_bytes = bytes_for(cell_data.len() as u64);

    let mut out = Vec::with_capacity(cell_data.len() + 32);
    out.extend_from_slice(&BOC_MAGIC);
    out.push(if with_crc { FLAG_HAS_CRC32C } else { 0 } | size_bytes as u8);
    out.push(off_bytes as u8);
    write_be(&mut out, order.len() as u64, size_bytes);
    write_be(&mut out, 1, size_bytes);
    write_be(&mut out, 0, size_bytes);
    write_be(&mut out, cell_data.len() as u64, off_bytes);
    write_be(&mut out, 0, size_bytes);
    out.extend_from_slice(&cell_data);
    if with_crc {
        let crc = crc32c(&out);
        out.extend_from_slice(&crc.to_le_bytes());
    }
    out
}

/// Base64 (standard alphabet) BoC with CRC32C, the form wallets exchange.
pub fn serialize_boc_base64(root: &Arc<Cell>) -> String {
    STANDARD.encode(serialize_boc(root, true))
}

/// Parse a BoC and return its first root.
pub fn deserialize_boc(bytes: &[u8]) -> Result<Arc<Cell>, CellError> {
    let mut r = Reader { buf: bytes, pos: 0 };
    if r.take(4)? != BOC_MAGIC {
        return Err(malformed("unknown bag-of-cells magic"));
    }
    let flags = r.byte()?;
    let has_index = flags & FLAG_HAS_INDEX != 0;
    let has_crc = flags & FLAG_HAS_CRC32C != 0;
    let size_bytes = (flags & 0x07) as usize;
    if size_bytes == 0 || size_bytes > 4 {
        return Err(malformed("invalid ref size"));
    }
    let off_bytes = r.byte()? as usize;
    if off_bytes == 0 || off_bytes > 8 {
        return Err(malformed("invalid offset size"));
    }

    let cell_count = r.uint(size_bytes)? as usize;
    let root_count = r.uint(size_bytes)? as usize;
    let _absent = r.uint(size_bytes)?;
    let tot_cells_size = r.uint(off_bytes)? as usize;
    if root_count == 0 || root_count > cell_count {
        return Err(malformed("invalid root count"));
    }
    // Header counts come from the wire: every cell takes at least its two
    // descriptor bytes, so none of them may exceed what is left to read.
    let left = r.remaining();
    let fits = |count: usize, width: usize| count.checked_mul(width).is_some_and(|n| n <= left);
    if !fits(cell_count, 2) || !fits(root_count, size_bytes) || tot_cells_size > left {
        return Err(malformed("header counts exceed payload size"));
    }
    let mut roots = Vec::with_capacity(root_count);
    for _ in 0..root_count {
        roots.push(r.uint(size_bytes)? as usize);
    }
    if has_index {
        let index_len = cell_count
            .checked_mul(off_bytes)
            .ok_or_else(|| malformed("index size overflow"))?;
        r.take(index_len)?;
    }

    let data_start = r.pos;
    let mut raw_cells = Vec::with_capacity(cell_count);
    for idx in 0..cell_count {
        let d1 = r.byte()?;
        let d2 = r.byte()?;
        if d1 & 0x18 != 0 || d1 >> 5 != 0 {
            return Err(malformed("exotic or leveled cells are not supported"));
        }
        let ref_count = (d1 & 0x07) as usize;
        if ref_count > 4 {
            return Err(malformed("too many refs"));
        }
        let data_len = (d2 as usize).div_ceil(2);
        let data = r.take(data_len)?.to_vec();
        let bit_len = if d2 % 2 == 1 {
            let last = *data.last().ok_or_else(|| malformed("missing data"))?;
            if last == 0 {
                return Err(malformed("missing completion tag"));
            }
            data_len * 8 - (last.trailing_zeros() as usize + 1)
        } else {
            data_len * 8
        };
        let mut refs = Vec::with_capacity(ref_count);
        for _ in 0..ref_count {
            let ref_idx = r.uint(size_bytes)? as usize;
            if ref_idx <= idx || ref_idx >= cell_count {
                return Err(malformed("ref index out of order"));
            }
            refs.push(ref_idx);
        }
        raw_cells.push((data, bit_len, refs));
    }
    if r.pos - data_start != tot_cells_size {
        return Err(malformed("cell data size mismatch"));
    }

    if has_crc {
        let body_end = r.pos;
        let stored = u32::from_le_bytes(
            r.take(4)?
                .try_into()
                .map_err(|_| malformed("missing crc32c"))?,
        );
        if crc32c(&bytes[..body_end]) != stored {
            return Err(malformed("crc32c mismatch"));
        }
    }

    // Refs always point forward, so build from the last cell back.
    let mut built: Vec<Option<Arc<Cell>>> = vec![None; cell_count];
    for idx in (0..cell_count).rev() {
        let (data, bit_len, ref_idx) = std::mem::take(&mut raw_cells[idx]);
        let refs = ref_idx
            .iter()
            .map(|&i| built[i].clone().ok_or_else(|| malformed("dangling ref")))
            .collect::<Result<Vec<_>, _>>()?;
        let cell = Cell::new(data, bit_len, refs)?;
        if usize::from(cell.depth()) > MAX_CELL_DEPTH {
            return Err(malformed("cell tree too deep"));
        }
        built[idx] = Some(Arc::new(cell));
    }

    let root = roots[0];
    built
        .get(root)
        .cloned()
        .flatten()
        .ok_or_else(|| malformed("root index out of range"))
}

pub fn deserialize_boc_base64(b64: &str) -> Result<Arc<Cell>, CellError> {
    let bytes = STANDARD
        .decode(b64.trim())
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(b64.trim()))
        .map_err(|e| malformed(&format!("invalid base64: {e}")))?;
    deserialize_boc(&bytes)
}

/// Reverse post-order DFS: every cell precedes the cells it references.
fn topological_order(root: &Arc<Cell>) -> Vec<Arc<Cell>> {
    fn visit(
        cell: &Arc<Cell>,
        seen: &mut HashMap<[u8; 32], ()>,
        post: &mut Vec<Arc<Cell>>,
    ) {
        if seen.insert(cell.hash(), ()).is_some() {
            return;
        }
        for r in cell.refs().iter().rev() {
            visit(r, seen, post);
        }
        post.push(Arc::clone(cell));
    }

    let mut seen = HashMap::new();
    let mut post = Vec::new();
    visit(root, &mut seen, &mut post);
    post.reverse();
    post
}

fn bytes_for(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

fn write_be(out: &mut Vec<u8>, value: u64, width: usize) {
    out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
}

fn malformed(msg: &str) -> CellError {
    CellError::Malformed(msg.to_string())
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CellError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|e| *e <= self.buf.len())
            .ok_or_else(|| malformed("unexpected end of data"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn byte(&mut self) -> Result<u8, CellError> {
        Ok(self.take(1)?[0])
    }

    fn uint(&mut self, width: usize) -> Result<u64, CellError> {
        Ok(self
            .take(width)?
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }
}
