//! Error kinds surfaced by the chunk store

use crate::log::ChunkType;
use crate::score::Score;
use std::io;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum Error {
    /// Index or key outside valid bounds (caller bug)
    #[error("{what}: index {index} out of range (length {len})")]
    OutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// Operation requires a leaf but the trie node is internal
    #[error("routing trie node {0} is not a leaf")]
    NotLeaf(usize),

    /// Structure is in the wrong state for the requested operation
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Score absent from the index or log (an expected outcome)
    #[error("score {0} not found")]
    NotFound(Score),

    /// On-disk content failed an internal consistency check
    #[error("corruption: {0}")]
    Corruption(String),

    /// No room left, even after restructuring
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Same content previously stored under a different type
    #[error("score {score} already stored with type {existing}, refusing type {requested}")]
    TypeConflict {
        score: Score,
        existing: ChunkType,
        requested: ChunkType,
    },

    /// Payload does not fit the 16-bit length field
    #[error("payload of {len} bytes exceeds the {max} byte record limit")]
    PayloadTooLarge { len: usize, max: usize },

    /// Invalid or unreadable configuration
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// True for the normal "not stored here" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub(crate) fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }
}
