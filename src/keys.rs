//! On-disk key schema and posting-list packing.
//!
//! Every key starts with a one-byte tag:
//!
//! | tag   | body                    | value                                |
//! |-------|-------------------------|--------------------------------------|
//! | `'I'` | 8-byte big-endian cell  | postings for the interior cover      |
//! | `'O'` | 8-byte big-endian cell  | postings for the exterior cover      |
//! | `'F'` | 4-byte big-endian id    | CBOR `StoredFeature`                 |
//! | `'C'` | 4-byte big-endian id    | CBOR `StoredCells`                   |
//! | `'i'` | (empty)                 | CBOR `IndexInfos`                    |
//!
//! A posting list is a concatenation of 6-byte records: a big-endian `u32`
//! feature id followed by a big-endian `u16` polygon index. Record order is
//! not semantic and readers tolerate duplicates.

use bytes::BufMut;
use s2::cellid::CellID;

use crate::error::{FenceError, Result};
use crate::types::PolygonRef;

pub const INSIDE_PREFIX: u8 = b'I';
pub const OUTSIDE_PREFIX: u8 = b'O';
pub const FEATURE_PREFIX: u8 = b'F';
pub const CELLS_PREFIX: u8 = b'C';
pub const INFO_KEY: u8 = b'i';

/// Byte length of one posting record.
pub const POSTING_LEN: usize = 4 + 2;

fn cell_key(prefix: u8, c: CellID) -> [u8; 9] {
    let mut k = [0u8; 9];
    k[0] = prefix;
    k[1..].copy_from_slice(&c.0.to_be_bytes());
    k
}

fn id_key(prefix: u8, id: u32) -> [u8; 5] {
    let mut k = [0u8; 5];
    k[0] = prefix;
    k[1..].copy_from_slice(&id.to_be_bytes());
    k
}

/// Key of the interior posting list for cell `c`.
pub fn inside_key(c: CellID) -> [u8; 9] {
    cell_key(INSIDE_PREFIX, c)
}

/// Key of the exterior posting list for cell `c`.
pub fn outside_key(c: CellID) -> [u8; 9] {
    cell_key(OUTSIDE_PREFIX, c)
}

/// Inclusive key range covering every interior posting whose cell is a
/// descendant (or self) of `c`.
pub fn inside_range(c: CellID) -> ([u8; 9], [u8; 9]) {
    (
        cell_key(INSIDE_PREFIX, c.range_min()),
        cell_key(INSIDE_PREFIX, c.range_max()),
    )
}

/// Inclusive key range for the exterior postings under `c`.
pub fn outside_range(c: CellID) -> ([u8; 9], [u8; 9]) {
    (
        cell_key(OUTSIDE_PREFIX, c.range_min()),
        cell_key(OUTSIDE_PREFIX, c.range_max()),
    )
}

/// Key of the feature blob for `id`.
pub fn feature_key(id: u32) -> [u8; 5] {
    id_key(FEATURE_PREFIX, id)
}

/// Key of the cover-cell blob for `id`.
pub fn cells_key(id: u32) -> [u8; 5] {
    id_key(CELLS_PREFIX, id)
}

/// Key of the terminal info record.
pub fn info_key() -> [u8; 1] {
    [INFO_KEY]
}

/// Cell id stored in the body of an `'I'`/`'O'` key.
pub fn cell_from_key(key: &[u8]) -> Result<CellID> {
    if key.len() != 9 {
        return Err(FenceError::Corruption(format!(
            "cell key has length {}",
            key.len()
        )));
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&key[1..]);
    Ok(CellID(u64::from_be_bytes(raw)))
}

/// Feature id stored in the body of an `'F'`/`'C'` key.
pub fn id_from_key(key: &[u8]) -> Result<u32> {
    if key.len() != 5 {
        return Err(FenceError::Corruption(format!(
            "feature key has length {}",
            key.len()
        )));
    }
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&key[1..]);
    Ok(u32::from_be_bytes(raw))
}

/// Appends one posting record to a value buffer.
pub fn push_posting(buf: &mut Vec<u8>, r: PolygonRef) {
    buf.put_u32(r.feature_id);
    buf.put_u16(r.polygon);
}

/// Decodes a posting-list value. Duplicates are preserved; callers dedup.
pub fn decode_postings(value: &[u8]) -> Result<Vec<PolygonRef>> {
    if value.len() % POSTING_LEN != 0 {
        return Err(FenceError::Corruption(format!(
            "posting list length {} is not a multiple of {}",
            value.len(),
            POSTING_LEN
        )));
    }
    let mut out = Vec::with_capacity(value.len() / POSTING_LEN);
    for rec in value.chunks_exact(POSTING_LEN) {
        let feature_id = u32::from_be_bytes([rec[0], rec[1], rec[2], rec[3]]);
        let polygon = u16::from_be_bytes([rec[4], rec[5]]);
        out.push(PolygonRef {
            feature_id,
            polygon,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell;

    #[test]
    fn keys_are_prefix_tagged_and_big_endian() {
        let c = cell::leaf_from_degrees(1.0, 2.0);
        let k = inside_key(c);
        assert_eq!(k[0], b'I');
        assert_eq!(u64::from_be_bytes(k[1..].try_into().unwrap()), c.0);
        assert_eq!(outside_key(c)[0], b'O');

        let f = feature_key(0x01020304);
        assert_eq!(f, [b'F', 1, 2, 3, 4]);
        assert_eq!(cells_key(7)[0], b'C');
        assert_eq!(info_key(), [b'i']);
    }

    #[test]
    fn range_keys_span_descendants() {
        let leaf = cell::leaf_from_degrees(48.0, 2.0);
        let parent = cell::parent(leaf, 8);
        let (lo, hi) = inside_range(parent);
        let k = inside_key(leaf);
        assert!(lo.as_slice() <= k.as_slice());
        assert!(k.as_slice() <= hi.as_slice());
    }

    #[test]
    fn key_round_trips() {
        let c = cell::leaf_from_degrees(-12.0, 33.0);
        assert_eq!(cell_from_key(&inside_key(c)).unwrap().0, c.0);
        assert_eq!(id_from_key(&feature_key(42)).unwrap(), 42);
        assert!(cell_from_key(&[b'I', 0, 1]).is_err());
        assert!(id_from_key(&[b'F']).is_err());
    }

    #[test]
    fn postings_round_trip_and_tolerate_duplicates() {
        let mut buf = Vec::new();
        let a = PolygonRef {
            feature_id: 9,
            polygon: 1,
        };
        let b = PolygonRef {
            feature_id: u32::MAX,
            polygon: u16::MAX,
        };
        push_posting(&mut buf, a);
        push_posting(&mut buf, b);
        push_posting(&mut buf, a);
        assert_eq!(buf.len(), 3 * POSTING_LEN);
        let decoded = decode_postings(&buf).unwrap();
        assert_eq!(decoded, vec![a, b, a]);
    }

    #[test]
    fn postings_reject_torn_records() {
        assert!(decode_postings(&[0, 0, 0, 1, 0]).is_err());
    }
}
