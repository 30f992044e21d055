//! # Key and RID Wire Format
//!
//! This module defines the typed index keys and the record locator (RID)
//! encoding shared with the heap-record layer. The encoding is fixed by
//! that boundary: the index stores exactly the bytes the record layer
//! hands it, so both sides decode each other's keys without translation.
//!
//! ## Key Encoding
//!
//! ```text
//! Int:    4 bytes, two's-complement i32, little-endian
//! Float:  4 bytes, IEEE-754 binary32 bits, little-endian
//! Text:   4-byte little-endian length prefix + raw bytes
//! ```
//!
//! Text is length-prefixed, not null-terminated, so embedded zero bytes
//! are legal key content.
//!
//! ## Ordering
//!
//! The encoding is NOT order-preserving under memcmp (negative integers
//! encode above positive ones, float bits reverse for negatives), so
//! comparison always decodes both operands:
//!
//! - Int: natural i32 order
//! - Float: IEEE-754 total order (`total_cmp`); NaN sorts above positive
//!   infinity, -0.0 below +0.0
//! - Text: lexicographic byte compare over the decoded span
//!
//! ## RID Encoding
//!
//! ```text
//! Rid (8 bytes):
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! |        page_no (4B, LE)           |        slot_no (4B, LE)           |
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! ```
//!
//! A RID identifies either a heap-record location (data RID) or a
//! duplicate-chain node inside the index's own overflow pages. Two
//! reserved values sit outside the valid page-number range: `end()`
//! terminates a duplicate chain and `tombstone()` marks a vacated chain
//! slot awaiting reuse.

use std::cmp::Ordering;

use eyre::{bail, ensure, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub const RID_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Int,
    Float,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    Int(i32),
    Float(f32),
    Text(Vec<u8>),
}

impl Key {
    /// Convenience constructor for text keys.
    pub fn text<B: AsRef<[u8]>>(bytes: B) -> Self {
        Key::Text(bytes.as_ref().to_vec())
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            Key::Int(_) => KeyType::Int,
            Key::Float(_) => KeyType::Float,
            Key::Text(_) => KeyType::Text,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Key::Int(_) | Key::Float(_) => 4,
            Key::Text(bytes) => 4 + bytes.len(),
        }
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Key::Int(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Key::Float(v) => buf.extend_from_slice(&v.to_bits().to_le_bytes()),
            Key::Text(bytes) => {
                buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                buf.extend_from_slice(bytes);
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Decodes a key from an exact-length encoded span.
    pub fn decode(key_type: KeyType, bytes: &[u8]) -> Result<Key> {
        match key_type {
            KeyType::Int => {
                ensure!(bytes.len() == 4, "bad int key length: {}", bytes.len());
                Ok(Key::Int(i32::from_le_bytes(bytes.try_into().unwrap())))
            }
            KeyType::Float => {
                ensure!(bytes.len() == 4, "bad float key length: {}", bytes.len());
                Ok(Key::Float(f32::from_bits(u32::from_le_bytes(
                    bytes.try_into().unwrap(),
                ))))
            }
            KeyType::Text => {
                ensure!(bytes.len() >= 4, "truncated text key: {} bytes", bytes.len());
                let len = u32::from_le_bytes(bytes[..4].try_into().unwrap()) as usize;
                ensure!(
                    bytes.len() == 4 + len,
                    "text key length prefix {} does not match span {}",
                    len,
                    bytes.len() - 4
                );
                Ok(Key::Text(bytes[4..].to_vec()))
            }
        }
    }

    /// Compares two keys of the same type. Mixed types are a caller bug
    /// and reported as corruption.
    pub fn compare(&self, other: &Key) -> Result<Ordering> {
        match (self, other) {
            (Key::Int(a), Key::Int(b)) => Ok(a.cmp(b)),
            (Key::Float(a), Key::Float(b)) => Ok(a.total_cmp(b)),
            (Key::Text(a), Key::Text(b)) => Ok(a.as_slice().cmp(b.as_slice())),
            (a, b) => bail!(
                "key type mismatch: {:?} vs {:?}",
                a.key_type(),
                b.key_type()
            ),
        }
    }

    /// Compares this key against an encoded span of the same type.
    pub fn cmp_encoded(&self, bytes: &[u8]) -> Result<Ordering> {
        let other = Key::decode(self.key_type(), bytes)?;
        self.compare(&other)
    }
}

/// Compares two encoded key spans of the given type.
pub fn compare_encoded(key_type: KeyType, a: &[u8], b: &[u8]) -> Result<Ordering> {
    let a = Key::decode(key_type, a)?;
    let b = Key::decode(key_type, b)?;
    a.compare(&b)
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned, PartialEq, Eq)]
pub struct Rid {
    page_no: U32,
    slot_no: U32,
}

const _: () = assert!(size_of::<Rid>() == RID_SIZE);

impl Rid {
    pub fn new(page_no: u32, slot_no: u32) -> Self {
        Self {
            page_no: U32::new(page_no),
            slot_no: U32::new(slot_no),
        }
    }

    /// Chain terminator.
    pub fn end() -> Self {
        Self::new(u32::MAX, u32::MAX)
    }

    /// Vacated chain slot awaiting reuse.
    pub fn tombstone() -> Self {
        Self::new(u32::MAX, u32::MAX - 1)
    }

    pub fn page_no(&self) -> u32 {
        self.page_no.get()
    }

    pub fn slot_no(&self) -> u32 {
        self.slot_no.get()
    }

    pub fn is_end(&self) -> bool {
        *self == Self::end()
    }

    pub fn is_tombstone(&self) -> bool {
        *self == Self::tombstone()
    }

    pub fn read_from(bytes: &[u8]) -> Result<Rid> {
        ensure!(bytes.len() == RID_SIZE, "bad rid length: {}", bytes.len());
        let rid = Rid::ref_from_bytes(bytes)
            .map_err(|e| eyre::eyre!("failed to read rid: {:?}", e))?;
        Ok(*rid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_key_encodes_little_endian() {
        assert_eq!(Key::Int(0x01020304).encode(), vec![0x04, 0x03, 0x02, 0x01]);
        assert_eq!(Key::Int(-1).encode(), vec![0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn float_key_encodes_ieee_bits() {
        assert_eq!(Key::Float(1.0).encode(), 1.0f32.to_bits().to_le_bytes());
    }

    #[test]
    fn text_key_encodes_length_prefix() {
        assert_eq!(
            Key::text("abc").encode(),
            vec![3, 0, 0, 0, b'a', b'b', b'c']
        );
        assert_eq!(Key::text("").encode(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn text_key_allows_embedded_zero_bytes() {
        let key = Key::Text(vec![0, 1, 0]);
        let encoded = key.encode();
        assert_eq!(Key::decode(KeyType::Text, &encoded).unwrap(), key);
    }

    #[test]
    fn decode_round_trips_all_types() {
        for key in [
            Key::Int(0),
            Key::Int(i32::MIN),
            Key::Int(i32::MAX),
            Key::Float(-2.5),
            Key::text("hello"),
        ] {
            let encoded = key.encode();
            assert_eq!(Key::decode(key.key_type(), &encoded).unwrap(), key);
        }
    }

    #[test]
    fn decode_rejects_bad_lengths() {
        assert!(Key::decode(KeyType::Int, &[1, 2, 3]).is_err());
        assert!(Key::decode(KeyType::Float, &[1, 2, 3, 4, 5]).is_err());
        assert!(Key::decode(KeyType::Text, &[3, 0, 0, 0, b'a']).is_err());
        assert!(Key::decode(KeyType::Text, &[1, 0]).is_err());
    }

    #[test]
    fn int_ordering_is_numeric_not_bytewise() {
        // Bytewise, -1 (FF FF FF FF) would sort above 1.
        assert_eq!(
            Key::Int(-1).cmp_encoded(&Key::Int(1).encode()).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            Key::Int(100).cmp_encoded(&Key::Int(100).encode()).unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn float_ordering_handles_negatives_and_nan() {
        let cmp = |a: f32, b: f32| {
            compare_encoded(
                KeyType::Float,
                &Key::Float(a).encode(),
                &Key::Float(b).encode(),
            )
            .unwrap()
        };
        assert_eq!(cmp(-2.0, -1.0), Ordering::Less);
        assert_eq!(cmp(-1.0, 1.0), Ordering::Less);
        assert_eq!(cmp(1.5, 1.5), Ordering::Equal);
        assert_eq!(cmp(f32::INFINITY, f32::NAN), Ordering::Less);
    }

    #[test]
    fn text_ordering_is_lexicographic() {
        let cmp = |a: &str, b: &str| {
            compare_encoded(KeyType::Text, &Key::text(a).encode(), &Key::text(b).encode()).unwrap()
        };
        assert_eq!(cmp("alpha", "bravo"), Ordering::Less);
        assert_eq!(cmp("abc", "ab"), Ordering::Greater);
        assert_eq!(cmp("same", "same"), Ordering::Equal);
    }

    #[test]
    fn mixed_type_comparison_is_an_error() {
        assert!(Key::Int(1).compare(&Key::text("1")).is_err());
    }

    #[test]
    fn rid_is_8_bytes_little_endian() {
        let rid = Rid::new(0x01020304, 0x0A0B0C0D);
        assert_eq!(
            rid.as_bytes(),
            &[0x04, 0x03, 0x02, 0x01, 0x0D, 0x0C, 0x0B, 0x0A]
        );
    }

    #[test]
    fn rid_round_trips_through_bytes() {
        let rid = Rid::new(42, 7);
        let parsed = Rid::read_from(rid.as_bytes()).unwrap();
        assert_eq!(parsed.page_no(), 42);
        assert_eq!(parsed.slot_no(), 7);
    }

    #[test]
    fn rid_sentinels_are_distinct() {
        assert!(Rid::end().is_end());
        assert!(!Rid::end().is_tombstone());
        assert!(Rid::tombstone().is_tombstone());
        assert_ne!(Rid::end(), Rid::tombstone());
        assert!(!Rid::new(0, 0).is_end());
    }
}
