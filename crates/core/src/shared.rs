//! Thread-safe store handle
//!
//! Reads move the log's seek position, so every operation, reads included,
//! takes the same lock.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::log::ChunkType;
use crate::score::Score;
use crate::store::{Store, StoreStats};
use crate::Result;

/// Cloneable handle to a store shared between threads
#[derive(Clone, Debug)]
pub struct SharedStore {
    inner: Arc<Mutex<Store>>,
}

impl SharedStore {
    pub fn new(store: Store) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn write(&self, chunk_type: ChunkType, data: &[u8]) -> Result<Score> {
        self.inner.lock().write(chunk_type, data)
    }

    pub fn read(&self, score: &Score) -> Result<(ChunkType, Vec<u8>)> {
        self.inner.lock().read(score)
    }

    pub fn lookup(&self, score: &Score) -> Result<Option<ChunkType>> {
        self.inner.lock().lookup(score)
    }

    pub fn stats(&self) -> StoreStats {
        self.inner.lock().stats()
    }

    pub fn sync(&self) -> Result<()> {
        self.inner.lock().sync()
    }

    /// Run `f` with exclusive access to the store
    pub fn with<R>(&self, f: impl FnOnce(&mut Store) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Recover the store once every other handle is gone
    pub fn into_inner(self) -> std::result::Result<Store, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}
