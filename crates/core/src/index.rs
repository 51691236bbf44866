//! Bucket index: dense bucket ids -> buckets
//!
//! The routing trie and the store only need two capabilities from the
//! index, expressed as [`AllocateBucket`] and [`ProvideBucket`], so either
//! can be swapped for a test double.

use std::io::{Read, Write};
use tracing::debug;

use crate::bucket::{Bucket, BUCKET_SIZE};
use crate::error::Error;
use crate::Result;

/// Can create a fresh bucket for a common prefix
pub trait AllocateBucket {
    /// Create an empty bucket and return its id
    fn allocate(&mut self, prefix_bits: usize, prefix: &[u8]) -> Result<u32>;
}

/// Can fetch buckets by id
pub trait ProvideBucket {
    fn bucket(&self, id: u32) -> Result<&Bucket>;

    fn bucket_mut(&mut self, id: u32) -> Result<&mut Bucket>;

    /// Swap a whole bucket image in
    fn replace(&mut self, id: u32, bucket: Bucket) -> Result<()> {
        *self.bucket_mut(id)? = bucket;
        Ok(())
    }
}

/// Owns every bucket of a store
#[derive(Debug, Clone)]
pub struct BucketIndex {
    /// Score bytes tracked per entry in new buckets
    score_width: usize,
    /// 0 if there is no limit
    max_buckets: u32,
    buckets: Vec<Bucket>,
}

impl BucketIndex {
    /// Create an empty index
    pub fn new(score_width: usize, max_buckets: u32) -> Self {
        Self {
            score_width,
            max_buckets,
            buckets: Vec::new(),
        }
    }

    /// Number of buckets allocated
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn max_buckets(&self) -> u32 {
        self.max_buckets
    }

    pub fn score_width(&self) -> usize {
        self.score_width
    }

    /// Buckets in id order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Bucket)> {
        self.buckets.iter().enumerate().map(|(i, b)| (i as u32, b))
    }

    /// Persist every bucket block in id order
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        for bucket in &self.buckets {
            w.write_all(bucket.as_block())?;
        }
        Ok(())
    }

    /// Load a sequence of bucket blocks
    pub fn read_from<R: Read>(r: &mut R, score_width: usize, max_buckets: u32) -> Result<Self> {
        let mut raw = Vec::new();
        r.read_to_end(&mut raw)?;
        if raw.len() % BUCKET_SIZE != 0 {
            return Err(Error::corruption(format!(
                "bucket index file has {} bytes (not a multiple of {})",
                raw.len(),
                BUCKET_SIZE
            )));
        }
        let buckets = raw
            .chunks_exact(BUCKET_SIZE)
            .map(Bucket::from_block)
            .collect::<Result<Vec<_>>>()?;
        if let Some((id, b)) = buckets
            .iter()
            .enumerate()
            .find(|(_, b)| b.score_width() != score_width)
        {
            return Err(Error::corruption(format!(
                "bucket {} has score width {}, index uses {}",
                id,
                b.score_width(),
                score_width
            )));
        }
        Ok(Self {
            score_width,
            max_buckets,
            buckets,
        })
    }
}

impl AllocateBucket for BucketIndex {
    fn allocate(&mut self, prefix_bits: usize, prefix: &[u8]) -> Result<u32> {
        let next = self.buckets.len();
        if self.max_buckets > 0 && next >= self.max_buckets as usize {
            return Err(Error::CapacityExceeded(format!(
                "bucket index is full ({} buckets)",
                self.max_buckets
            )));
        }
        let id = u32::try_from(next)
            .ok()
            .filter(|&id| id != crate::trie::NOT_LEAF)
            .ok_or_else(|| Error::CapacityExceeded("bucket ids exhausted".to_string()))?;
        self.buckets
            .push(Bucket::new(self.score_width, prefix_bits, prefix)?);
        debug!(id, prefix_bits, "bucket allocated");
        Ok(id)
    }
}

impl ProvideBucket for BucketIndex {
    fn bucket(&self, id: u32) -> Result<&Bucket> {
        self.buckets
            .get(id as usize)
            .ok_or_else(|| Error::corruption(format!("unknown bucket id {}", id)))
    }

    fn bucket_mut(&mut self, id: u32) -> Result<&mut Bucket> {
        self.buckets
            .get_mut(id as usize)
            .ok_or_else(|| Error::corruption(format!("unknown bucket id {}", id)))
    }
}
