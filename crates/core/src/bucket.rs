//! Packed bucket format
//!
//! A bucket is one 8 KiB block mapping partial scores to content-log
//! addresses. Every score routed to a bucket shares the same leading bits
//! (the common prefix), so only the remaining bytes of each score are
//! stored.
//!
//! ```text
//! offset  size          field
//! 0       4             magic "CSB1"
//! 4       2             entry count (big-endian)
//! 6       1             address width in bytes
//! 7       1             score width in bytes
//! 8       1             common-prefix bit count
//! 9       ceil(bits/8)  common-prefix value
//! ..      ..            entries: suffix (score_width - bits/8) + address (address_width)
//! ```

use smallvec::SmallVec;
use std::fmt;
use tracing::{debug, warn};

use crate::error::Error;
use crate::score::{bit_at, Score, SCORE_SIZE};
use crate::Result;

/// Size of a bucket block in bytes
pub const BUCKET_SIZE: usize = 8192;

/// Magic bytes at the start of every bucket
pub const BUCKET_MAGIC: [u8; 4] = *b"CSB1";

/// Widest address a bucket can hold
pub const MAX_ADDRESS_WIDTH: usize = 8;

/// Header bytes before the common-prefix value
const FIXED_HEADER: usize = 9;

const COUNT_OFFSET: usize = 4;
const ADDRESS_WIDTH_OFFSET: usize = 6;
const SCORE_WIDTH_OFFSET: usize = 7;
const PREFIX_BITS_OFFSET: usize = 8;

/// Longest common prefix the 8-bit header field can describe
const MAX_PREFIX_BITS: usize = u8::MAX as usize;

/// Minimal number of bytes needed to hold `addr` (zero needs none)
pub fn address_width_for(addr: u64) -> usize {
    (64 - addr.leading_zeros() as usize).div_ceil(8)
}

/// Fixed-size block of (partial score, address) entries
#[derive(Clone, PartialEq, Eq)]
pub struct Bucket {
    block: Box<[u8]>,
}

impl Bucket {
    /// Create an empty bucket with no address bytes allocated yet
    ///
    /// `prefix` must hold at least `ceil(prefix_bits / 8)` bytes; bits past
    /// `prefix_bits` are cleared.
    pub fn new(score_width: usize, prefix_bits: usize, prefix: &[u8]) -> Result<Self> {
        Self::with_address_width(score_width, prefix_bits, prefix, 0)
    }

    fn with_address_width(
        score_width: usize,
        prefix_bits: usize,
        prefix: &[u8],
        address_width: usize,
    ) -> Result<Self> {
        if score_width == 0 || score_width > SCORE_SIZE {
            return Err(Error::InvalidState(format!(
                "bucket score width {} outside 1..={}",
                score_width, SCORE_SIZE
            )));
        }
        if prefix_bits > score_width * 8 || prefix_bits > MAX_PREFIX_BITS {
            return Err(Error::InvalidState(format!(
                "common prefix of {} bits does not fit a {}-byte score width",
                prefix_bits, score_width
            )));
        }
        if address_width > MAX_ADDRESS_WIDTH {
            return Err(Error::InvalidState(format!(
                "address width {} exceeds {}",
                address_width, MAX_ADDRESS_WIDTH
            )));
        }
        let prefix_len = prefix_bits.div_ceil(8);
        if prefix.len() < prefix_len {
            return Err(Error::InvalidState(format!(
                "common prefix of {} bits needs {} bytes, got {}",
                prefix_bits,
                prefix_len,
                prefix.len()
            )));
        }

        let mut block = vec![0u8; BUCKET_SIZE].into_boxed_slice();
        block[..4].copy_from_slice(&BUCKET_MAGIC);
        block[ADDRESS_WIDTH_OFFSET] = address_width as u8;
        block[SCORE_WIDTH_OFFSET] = score_width as u8;
        block[PREFIX_BITS_OFFSET] = prefix_bits as u8;
        let dst = &mut block[FIXED_HEADER..FIXED_HEADER + prefix_len];
        dst.copy_from_slice(&prefix[..prefix_len]);
        if prefix_bits % 8 != 0 {
            dst[prefix_len - 1] &= 0xFFu8 << (8 - prefix_bits % 8);
        }
        Ok(Self { block })
    }

    /// Decode a stored block, validating the header and entry area
    pub fn from_block(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != BUCKET_SIZE {
            return Err(Error::corruption(format!(
                "bucket block is {} bytes, expected {}",
                bytes.len(),
                BUCKET_SIZE
            )));
        }
        if bytes[..4] != BUCKET_MAGIC {
            return Err(Error::corruption(format!(
                "bad bucket magic {:02x?}",
                &bytes[..4]
            )));
        }
        let bucket = Self {
            block: bytes.to_vec().into_boxed_slice(),
        };

        let sw = bucket.score_width();
        if sw == 0 || sw > SCORE_SIZE {
            return Err(Error::corruption(format!("bucket score width {}", sw)));
        }
        if bucket.address_width() > MAX_ADDRESS_WIDTH {
            return Err(Error::corruption(format!(
                "bucket address width {}",
                bucket.address_width()
            )));
        }
        let bits = bucket.prefix_bits();
        if bits > sw * 8 {
            return Err(Error::corruption(format!(
                "bucket prefix of {} bits exceeds score width {}",
                bits, sw
            )));
        }
        if bits % 8 != 0 {
            let last = bucket.prefix_bytes()[bits / 8];
            if last & (0xFFu8 >> (bits % 8)) != 0 {
                return Err(Error::corruption("bucket prefix has bits past its length"));
            }
        }
        if bucket.len() > bucket.max_entries(bucket.address_width()) {
            return Err(Error::corruption(format!(
                "bucket claims {} entries of {} bytes",
                bucket.len(),
                bucket.entry_size()
            )));
        }
        let (prefix, mask) = bucket.common_prefix();
        if let Some((score, _)) = bucket.entries().find(|(s, _)| !s.matches(&prefix, mask)) {
            return Err(Error::corruption(format!(
                "bucket entry {} outside common prefix",
                score
            )));
        }
        Ok(bucket)
    }

    /// The bit-exact block image
    pub fn as_block(&self) -> &[u8] {
        &self.block
    }

    /// Number of entries stored
    pub fn len(&self) -> usize {
        u16::from_be_bytes([self.block[COUNT_OFFSET], self.block[COUNT_OFFSET + 1]]) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes used for each address
    pub fn address_width(&self) -> usize {
        self.block[ADDRESS_WIDTH_OFFSET] as usize
    }

    /// Leading score bytes tracked per entry (prefix included)
    pub fn score_width(&self) -> usize {
        self.block[SCORE_WIDTH_OFFSET] as usize
    }

    /// Length of the common prefix in bits
    pub fn prefix_bits(&self) -> usize {
        self.block[PREFIX_BITS_OFFSET] as usize
    }

    fn prefix_bytes(&self) -> &[u8] {
        &self.block[FIXED_HEADER..FIXED_HEADER + self.prefix_bits().div_ceil(8)]
    }

    /// Bytes before the entry area
    pub fn header_size(&self) -> usize {
        FIXED_HEADER + self.prefix_bits().div_ceil(8)
    }

    fn suffix_start(&self) -> usize {
        self.prefix_bits() / 8
    }

    fn suffix_len(&self) -> usize {
        self.score_width() - self.suffix_start()
    }

    /// Bytes per entry at the current address width
    pub fn entry_size(&self) -> usize {
        self.suffix_len() + self.address_width()
    }

    /// Header size of this bucket's split children
    ///
    /// The entry area stops short of it, so either child of a split can
    /// take every entry of its parent.
    pub fn split_header_size(&self) -> usize {
        FIXED_HEADER + (self.prefix_bits() + 1).div_ceil(8)
    }

    /// Unused bytes in the entry area
    pub fn free_space(&self) -> usize {
        BUCKET_SIZE - self.split_header_size() - self.len() * self.entry_size()
    }

    fn max_entries(&self, address_width: usize) -> usize {
        let entry_size = self.suffix_len() + address_width;
        let room = BUCKET_SIZE - self.split_header_size();
        match room.checked_div(entry_size) {
            Some(n) => n.min(u16::MAX as usize),
            None => u16::MAX as usize,
        }
    }

    /// The bits every entry shares, as `(score, mask_bits)`
    pub fn common_prefix(&self) -> (Score, usize) {
        (Score::from_prefix(self.prefix_bytes()), self.prefix_bits())
    }

    /// Entry `i` as (partial score, address)
    ///
    /// The partial score carries the first `score_width` bytes; the rest
    /// are zero.
    fn entry(&self, i: usize) -> (Score, u64) {
        let start = self.header_size() + i * self.entry_size();
        let split = start + self.suffix_len();
        let end = split + self.address_width();

        let mut bytes = [0u8; SCORE_SIZE];
        let s = self.suffix_start();
        bytes[..s].copy_from_slice(&self.prefix_bytes()[..s]);
        bytes[s..self.score_width()].copy_from_slice(&self.block[start..split]);

        let mut addr = [0u8; 8];
        addr[8 - self.address_width()..].copy_from_slice(&self.block[split..end]);
        (Score::from_bytes(bytes), u64::from_be_bytes(addr))
    }

    /// All entries in insertion order
    pub fn entries(&self) -> impl Iterator<Item = (Score, u64)> + '_ {
        (0..self.len()).map(move |i| self.entry(i))
    }

    /// Addresses of every entry whose stored score bytes equal `score`'s
    pub fn lookup(&self, score: &Score) -> SmallVec<[u64; 4]> {
        let mask = self.score_width() * 8;
        self.entries()
            .filter(|(s, _)| s.matches(score, mask))
            .map(|(_, addr)| addr)
            .collect()
    }

    /// Append an entry, growing the address width if needed
    ///
    /// Returns false, leaving the bucket untouched, when the score is
    /// outside the common prefix or there is no room.
    pub fn insert(&mut self, score: &Score, addr: u64) -> bool {
        let (prefix, mask) = self.common_prefix();
        if !score.matches(&prefix, mask) {
            warn!(%score, prefix_bits = mask, "score outside bucket prefix");
            return false;
        }

        let needed = address_width_for(addr);
        if needed <= self.address_width() {
            return self.push_entry(score, addr);
        }

        if self.len() + 1 > self.max_entries(needed) {
            return false;
        }
        // Re-encode every entry at the wider address into a fresh image
        let mut grown = match Self::with_address_width(
            self.score_width(),
            self.prefix_bits(),
            self.prefix_bytes(),
            needed,
        ) {
            Ok(b) => b,
            Err(_) => return false,
        };
        for (s, a) in self.entries() {
            if !grown.push_entry(&s, a) {
                return false;
            }
        }
        if !grown.push_entry(score, addr) {
            return false;
        }
        debug!(
            from = self.address_width(),
            to = needed,
            entries = self.len(),
            "bucket address width grown"
        );
        *self = grown;
        true
    }

    /// Append at the current width; false if the entry does not fit
    fn push_entry(&mut self, score: &Score, addr: u64) -> bool {
        let count = self.len();
        if count + 1 > self.max_entries(self.address_width()) {
            return false;
        }
        let aw = self.address_width();
        let start = self.header_size() + count * self.entry_size();
        let split = start + self.suffix_len();
        let (s, sw) = (self.suffix_start(), self.score_width());
        self.block[start..split].copy_from_slice(&score.as_bytes()[s..sw]);
        self.block[split..split + aw].copy_from_slice(&addr.to_be_bytes()[8 - aw..]);
        self.block[COUNT_OFFSET..COUNT_OFFSET + 2]
            .copy_from_slice(&((count + 1) as u16).to_be_bytes());
        true
    }

    /// Partition entries into two buckets by the bit after the common prefix
    ///
    /// Returns `(zero_side, one_side)`; both have one more prefix bit. A
    /// side may receive every entry; the store splits it again.
    pub fn split(&self) -> Result<(Bucket, Bucket)> {
        let bits = self.prefix_bits();
        if bits >= self.score_width() * 8 || bits >= MAX_PREFIX_BITS {
            return Err(Error::CapacityExceeded(format!(
                "bucket prefix already covers {} bits of a {}-byte score width",
                bits,
                self.score_width()
            )));
        }

        let child_len = (bits + 1).div_ceil(8);
        let mut left_prefix = [0u8; SCORE_SIZE];
        left_prefix[..self.prefix_bytes().len()].copy_from_slice(self.prefix_bytes());
        let mut right_prefix = left_prefix;
        right_prefix[bits / 8] |= 0x80 >> (bits % 8);

        let aw = self.address_width();
        let sw = self.score_width();
        let mut left = Self::with_address_width(sw, bits + 1, &left_prefix[..child_len], aw)?;
        let mut right = Self::with_address_width(sw, bits + 1, &right_prefix[..child_len], aw)?;

        for (score, addr) in self.entries() {
            let side = if bit_at(score.as_bytes(), bits) {
                &mut right
            } else {
                &mut left
            };
            if !side.push_entry(&score, addr) {
                return Err(Error::CapacityExceeded(format!(
                    "split child of {}-bit prefix cannot hold its share of {} entries",
                    bits + 1,
                    self.len()
                )));
            }
        }
        Ok((left, right))
    }
}

impl fmt::Debug for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("entries", &self.len())
            .field("address_width", &self.address_width())
            .field("score_width", &self.score_width())
            .field("prefix_bits", &self.prefix_bits())
            .field("prefix", &hex::encode(self.prefix_bytes()))
            .finish()
    }
}
