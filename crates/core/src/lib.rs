//! Chunkstore Core - Content-addressed, deduplicating chunk storage
//!
//! This crate provides the storage engine:
//! - SHA-512/256 scores
//! - Routing trie (score bits -> bucket id)
//! - Packed 8 KiB buckets with common-prefix compression
//! - Append-only content log
//! - The `Store` that ties them together with dedup and bucket splitting

pub mod bucket;
pub mod bytestore;
pub mod config;
pub mod error;
pub mod index;
pub mod log;
pub mod score;
pub mod shared;
pub mod store;
pub mod trie;

// Re-export main types for convenience
pub use bucket::{Bucket, BUCKET_SIZE};
pub use bytestore::{ByteStore, FileStore, MemoryBuffer};
pub use config::StoreConfig;
pub use error::Error;
pub use index::{AllocateBucket, BucketIndex, ProvideBucket};
pub use log::{ChunkType, ContentLog, Record};
pub use score::{Score, SCORE_SIZE};
pub use shared::SharedStore;
pub use store::{Store, StoreStats};
pub use trie::{RoutingTrie, NOT_LEAF};

/// Common result type used throughout chunkstore-core
pub type Result<T> = std::result::Result<T, Error>;
