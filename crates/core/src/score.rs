//! SHA-512/256 scores for content-addressed storage

use sha2::{Digest, Sha512_256};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Size of a score in bytes
pub const SCORE_SIZE: usize = 32;

/// Number of bits in a score
pub const SCORE_BITS: usize = SCORE_SIZE * 8;

/// A content fingerprint (32 bytes)
///
/// Only bitwise equality and MSB-first bit access carry meaning; the
/// derived ordering exists so scores can key sorted collections.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Default)]
pub struct Score([u8; SCORE_SIZE]);

impl Score {
    /// The all-zero sentinel meaning "no entry"
    pub const ZERO: Score = Score([0; SCORE_SIZE]);

    /// Create a score from raw bytes
    pub const fn from_bytes(bytes: [u8; SCORE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a score from a leading byte slice, zero-filling the rest
    ///
    /// Used to rebuild partial scores and common prefixes.
    pub fn from_prefix(prefix: &[u8]) -> Self {
        let mut bytes = [0u8; SCORE_SIZE];
        let n = prefix.len().min(SCORE_SIZE);
        bytes[..n].copy_from_slice(&prefix[..n]);
        Self(bytes)
    }

    /// Score a block of bytes
    pub fn compute(data: &[u8]) -> Self {
        let digest = Sha512_256::digest(data);
        let mut bytes = [0u8; SCORE_SIZE];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Get the score as a byte array
    pub fn as_bytes(&self) -> &[u8; SCORE_SIZE] {
        &self.0
    }

    /// Whether this is the zero sentinel
    pub fn is_zero(&self) -> bool {
        self.0 == [0; SCORE_SIZE]
    }

    /// Bit `n`, counted from the most significant bit of byte 0
    ///
    /// Bits past the end of the score read as zero.
    pub fn bit(&self, n: usize) -> bool {
        bit_at(&self.0, n)
    }

    /// Compare the top `mask_bits` bits of two scores
    ///
    /// `mask_bits == 0` always matches; anything at or past 256 compares
    /// the whole score.
    pub fn matches(&self, other: &Score, mask_bits: usize) -> bool {
        let mask_bits = mask_bits.min(SCORE_BITS);
        let full = mask_bits / 8;
        if self.0[..full] != other.0[..full] {
            return false;
        }
        let rest = mask_bits % 8;
        if rest == 0 {
            return true;
        }
        let mask = 0xFFu8 << (8 - rest);
        (self.0[full] & mask) == (other.0[full] & mask)
    }

    /// Convert to a lowercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-character hex string
    pub fn from_hex(s: &str) -> Result<Self, Error> {
        if s.len() != SCORE_SIZE * 2 {
            return Err(Error::InvalidState(format!(
                "invalid score length: expected {} hex characters, got {}",
                SCORE_SIZE * 2,
                s.len()
            )));
        }
        let mut bytes = [0u8; SCORE_SIZE];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| Error::InvalidState(format!("invalid score '{}': {}", s, e)))?;
        Ok(Self(bytes))
    }
}

/// Flat MSB-first bit extraction: bit `n` is byte `n/8`, mask `0x80 >> (n%8)`
///
/// Returns false when `n` is past the end of `bytes`.
pub fn bit_at(bytes: &[u8], n: usize) -> bool {
    bytes
        .get(n / 8)
        .is_some_and(|b| b & (0x80 >> (n % 8)) != 0)
}

impl FromStr for Score {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for Score {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Score({})", self.to_hex())
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY: &str = "c672b8d1ef56ed28ab87c3622c5114069bdd3ad7b8f9737498d0c01ecef0967a";
    const EMPTY_TWICE: &str = "a8dfa748acde437f7b36261eae56f6e6078de914de28f87295d4f7aac568b16e";

    #[test]
    fn test_zero_score() {
        assert_eq!(Score::ZERO.to_hex(), "0".repeat(64));
        assert!(Score::ZERO.is_zero());
        assert!(!Score::compute(b"").is_zero());
    }

    #[test]
    fn test_known_vectors() {
        let s = Score::compute(&[]);
        assert_eq!(s.to_string(), EMPTY);

        let s2 = Score::compute(s.to_string().as_bytes());
        assert_eq!(s2.to_string(), EMPTY_TWICE);
    }

    #[test]
    fn test_hash_consistency() {
        let data = b"hello world";
        assert_eq!(Score::compute(data), Score::compute(data));
        assert_ne!(Score::compute(b"hello"), Score::compute(b"world"));
    }

    #[test]
    fn test_hex_roundtrip_and_errors() {
        let s = Score::compute(b"abc");
        assert_eq!(Score::from_hex(&s.to_hex()).unwrap(), s);
        assert_eq!(s.to_hex().parse::<Score>().unwrap(), s);
        assert!(Score::from_hex("abc").is_err());
        assert!(Score::from_hex(&"g".repeat(64)).is_err());
    }

    #[test]
    fn test_bit_order_is_msb_first() {
        let mut bytes = [0u8; SCORE_SIZE];
        bytes[0] = 0b1000_0000;
        bytes[1] = 0b0000_0001;
        let s = Score::from_bytes(bytes);
        assert!(s.bit(0));
        assert!(!s.bit(1));
        assert!(!s.bit(8));
        assert!(s.bit(15));
        assert!(!s.bit(255));
    }

    #[test]
    fn test_bits_past_the_end_are_zero() {
        let s = Score::from_bytes([0xFF; SCORE_SIZE]);
        assert!(s.bit(SCORE_BITS - 1));
        assert!(!s.bit(SCORE_BITS));
        assert!(!s.bit(usize::MAX));
        assert!(!bit_at(&[], 0));
        assert!(bit_at(&[0x01], 7));
        assert!(!bit_at(&[0x01], 8));
    }

    #[test]
    fn test_matches_masks() {
        let a = Score::from_prefix(&[0b1010_1010, 0xFF]);
        let b = Score::from_prefix(&[0b1010_0000, 0x00]);
        assert!(a.matches(&b, 0));
        assert!(a.matches(&b, 4));
        assert!(!a.matches(&b, 5));
        assert!(!a.matches(&b, 16));
        assert!(a.matches(&a, 256));
        assert!(a.matches(&a, 1000));
        assert!(!a.matches(&Score::ZERO, 1));
    }

    #[test]
    fn test_from_prefix_zero_fills() {
        let s = Score::from_prefix(&[1, 2, 3]);
        assert_eq!(&s.as_bytes()[..3], &[1, 2, 3]);
        assert!(s.as_bytes()[3..].iter().all(|&b| b == 0));
    }
}
