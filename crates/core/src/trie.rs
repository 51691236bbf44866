//! Routing trie: score bits -> bucket id
//!
//! An implicit binary heap of `u32` slots. Node `i` has children `2i+1`
//! (next score bit is 0) and `2i+2` (next score bit is 1). A slot holds
//! either [`NOT_LEAF`] or the id of the bucket that owns every score whose
//! leading bits spell the path to that node.

use std::io::{Read, Write};

use crate::error::Error;
use crate::index::AllocateBucket;
use crate::score::{Score, SCORE_BITS};
use crate::Result;

/// Marker for an internal node
pub const NOT_LEAF: u32 = u32::MAX;

/// Array-encoded binary trie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTrie {
    table: Vec<u32>,
}

impl RoutingTrie {
    /// A trie whose single root leaf routes everything to `root_bucket`
    pub fn new(root_bucket: u32) -> Self {
        Self {
            table: vec![root_bucket],
        }
    }

    /// Allocate the root bucket (empty common prefix) and build a trie on it
    pub fn with_root<A: AllocateBucket + ?Sized>(allocator: &mut A) -> Result<Self> {
        let root = allocator.allocate(0, &[])?;
        Ok(Self::new(root))
    }

    /// Rebuild a trie from `(bucket_id, prefix, prefix_bits)` triples
    ///
    /// Every bucket becomes the leaf at the node its prefix spells. The
    /// prefixes must cover the score space exactly once; an overlap or a
    /// gap is [`Error::Corruption`].
    pub fn from_prefixes<I>(leaves: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u32, Score, usize)>,
    {
        let mut slots: Vec<Option<u32>> = Vec::new();
        for (bucket, prefix, bits) in leaves {
            if bucket == NOT_LEAF {
                return Err(Error::corruption(
                    "bucket id collides with the internal-node marker",
                ));
            }
            let mut k = 0usize;
            for b in 0..bits {
                claim(&mut slots, k, NOT_LEAF, bucket)?;
                k = k
                    .checked_mul(2)
                    .and_then(|k| k.checked_add(if prefix.bit(b) { 2 } else { 1 }))
                    .filter(|&k| k < u32::MAX as usize)
                    .ok_or_else(|| {
                        Error::corruption(format!(
                            "bucket {} has a {}-bit prefix, too deep to route",
                            bucket, bits
                        ))
                    })?;
            }
            claim(&mut slots, k, bucket, bucket)?;
        }

        let mut stack = vec![0usize];
        while let Some(i) = stack.pop() {
            match slots.get(i).copied().flatten() {
                None => {
                    return Err(Error::corruption(format!(
                        "no bucket covers routing trie node {}",
                        i
                    )))
                }
                Some(NOT_LEAF) => {
                    stack.push(2 * i + 1);
                    stack.push(2 * i + 2);
                }
                Some(_) => {}
            }
        }

        Ok(Self {
            table: slots.into_iter().map(|s| s.unwrap_or(0)).collect(),
        })
    }

    /// Number of slots in the table
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Raw slot access
    pub fn get(&self, k: usize) -> Result<u32> {
        self.table.get(k).copied().ok_or(Error::OutOfRange {
            what: "RoutingTrie::get",
            index: k,
            len: self.table.len(),
        })
    }

    /// Overwrite the bucket id of an existing leaf
    pub fn set(&mut self, k: usize, v: u32) -> Result<()> {
        let len = self.table.len();
        let slot = self.table.get_mut(k).ok_or(Error::OutOfRange {
            what: "RoutingTrie::set",
            index: k,
            len,
        })?;
        if *slot == NOT_LEAF {
            return Err(Error::NotLeaf(k));
        }
        *slot = v;
        Ok(())
    }

    /// Walk from the root following the score's bits until a leaf
    ///
    /// Returns `(node_index, bucket_id)`.
    pub fn route(&self, score: &Score) -> (usize, u32) {
        let mut i = 0;
        for b in 0..=SCORE_BITS {
            let v = self.table[i];
            if v != NOT_LEAF {
                return (i, v);
            }
            assert!(b < SCORE_BITS, "routing trie deeper than a score");
            i = if score.bit(b) { 2 * i + 2 } else { 2 * i + 1 };
        }
        unreachable!("routing trie descent always ends at a leaf")
    }

    /// Turn leaf `k` into an internal node
    ///
    /// The left child keeps the old bucket id, the right child gets
    /// `right_bucket`.
    pub fn split(&mut self, k: usize, right_bucket: u32) -> Result<()> {
        let old = match self.table.get(k) {
            None => {
                return Err(Error::OutOfRange {
                    what: "RoutingTrie::split",
                    index: k,
                    len: self.table.len(),
                })
            }
            Some(&NOT_LEAF) => return Err(Error::NotLeaf(k)),
            Some(&v) => v,
        };
        if depth_of(k) >= SCORE_BITS {
            return Err(Error::CapacityExceeded(format!(
                "routing trie node {} already consumes every score bit",
                k
            )));
        }
        if self.table.len() <= 2 * k + 2 {
            self.table.resize(2 * k + 3, 0);
        }
        self.table[2 * k + 1] = old;
        self.table[2 * k + 2] = right_bucket;
        self.table[k] = NOT_LEAF;
        Ok(())
    }

    /// Every reachable leaf as `(node_index, depth, bucket_id)`, left to right
    pub fn leaves(&self) -> Vec<(usize, usize, u32)> {
        let mut out = Vec::new();
        let mut stack = vec![0usize];
        while let Some(i) = stack.pop() {
            match self.table.get(i) {
                Some(&NOT_LEAF) => {
                    stack.push(2 * i + 2);
                    stack.push(2 * i + 1);
                }
                Some(&v) => out.push((i, depth_of(i), v)),
                None => {}
            }
        }
        out
    }

    /// Depth of the deepest leaf
    pub fn max_depth(&self) -> usize {
        self.leaves().iter().map(|&(_, d, _)| d).max().unwrap_or(0)
    }

    /// Persist as big-endian `u32` slots in heap order
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        for v in &self.table {
            w.write_all(&v.to_be_bytes())?;
        }
        Ok(())
    }

    /// Load a persisted table, checking that every path ends in a leaf
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut raw = Vec::new();
        r.read_to_end(&mut raw)?;
        if raw.is_empty() || raw.len() % 4 != 0 {
            return Err(Error::corruption(format!(
                "routing trie file has {} bytes (expected a non-zero multiple of 4)",
                raw.len()
            )));
        }
        let table: Vec<u32> = raw
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let trie = Self { table };
        trie.validate()?;
        Ok(trie)
    }

    /// Check that every internal node has both children in the table
    pub fn validate(&self) -> Result<()> {
        let mut stack = vec![0usize];
        while let Some(i) = stack.pop() {
            match self.table.get(i) {
                None => {
                    return Err(Error::corruption(format!(
                        "routing trie path ends at missing slot {}",
                        i
                    )))
                }
                Some(&NOT_LEAF) => {
                    if depth_of(i) >= SCORE_BITS {
                        return Err(Error::corruption(format!(
                            "routing trie node {} is internal below the last score bit",
                            i
                        )));
                    }
                    stack.push(2 * i + 1);
                    stack.push(2 * i + 2);
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Mark slot `k` as internal (`NOT_LEAF`) or as a leaf for `bucket`
fn claim(slots: &mut Vec<Option<u32>>, k: usize, value: u32, bucket: u32) -> Result<()> {
    if slots.len() <= k {
        slots.resize(k + 1, None);
    }
    match slots[k] {
        None => slots[k] = Some(value),
        Some(NOT_LEAF) if value == NOT_LEAF => {}
        Some(_) => {
            return Err(Error::corruption(format!(
                "bucket {} overlaps another bucket's prefix at routing trie node {}",
                bucket, k
            )))
        }
    }
    Ok(())
}

/// Number of score bits consumed to reach node `k`
pub fn depth_of(k: usize) -> usize {
    (usize::BITS - 1 - (k + 1).leading_zeros()) as usize
}
