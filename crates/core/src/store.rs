//! The chunk store: routing, dedup, bucket splitting and persistence

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use crate::bucket::Bucket;
use crate::bytestore::{FileStore, MemoryBuffer};
use crate::config::StoreConfig;
use crate::error::Error;
use crate::index::{AllocateBucket, BucketIndex, ProvideBucket};
use crate::log::{ChunkType, ContentLog};
use crate::score::Score;
use crate::trie::{depth_of, RoutingTrie};
use crate::Result;

const CONFIG_FILE: &str = "config.toml";
const TRIE_FILE: &str = "trie.bin";
const INDEX_FILE: &str = "index.bin";
const LOG_FILE: &str = "data.log";

/// Content-addressed chunk store
///
/// Manages the store directory:
/// ```text
/// <dir>/
///   config.toml   tunables fixed at creation
///   trie.bin      routing trie, big-endian u32 slots
///   index.bin     bucket blocks, 8 KiB each, in id order
///   data.log      append-only content log
/// ```
///
/// The trie and index are rewritten on [`Store::sync`]; the log is written
/// as chunks arrive. Records the index lost in a crash are re-indexed by
/// [`Store::open`].
pub struct Store<I = BucketIndex> {
    /// Store directory (None for in-memory stores)
    root: Option<PathBuf>,
    config: StoreConfig,
    trie: RoutingTrie,
    index: I,
    log: ContentLog,
}

impl<I: AllocateBucket + ProvideBucket> Store<I> {
    /// Assemble a store from an empty index and a log
    ///
    /// Allocates the root bucket from `index`.
    pub fn with_parts(config: StoreConfig, mut index: I, log: ContentLog) -> Result<Self> {
        config.validate()?;
        let trie = RoutingTrie::with_root(&mut index)?;
        Ok(Self {
            root: None,
            config,
            trie,
            index,
            log,
        })
    }

    /// Store a chunk and return its score
    ///
    /// Writing content that is already stored under the same type is a
    /// no-op. The same content under a different type fails with
    /// [`Error::TypeConflict`] and leaves the store untouched.
    #[instrument(skip(self, data), fields(len = data.len()), level = "debug")]
    pub fn write(&mut self, chunk_type: ChunkType, data: &[u8]) -> Result<Score> {
        let score = Score::compute(data);

        // Route
        let (_, bucket_id) = self.trie.route(&score);
        let candidates = self.index.bucket(bucket_id)?.lookup(&score);

        // Dedup check
        for addr in candidates {
            match self.log.verify(&score, addr) {
                Ok(existing) if existing == chunk_type => {
                    debug!(%score, addr, "dedup hit");
                    return Ok(score);
                }
                Ok(existing) => {
                    return Err(Error::TypeConflict {
                        score,
                        existing,
                        requested: chunk_type,
                    })
                }
                // Partial-score collision with another chunk
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }

        // Append
        let addr = self.log.append(&score, chunk_type, data)?;

        // Bucket insert, splitting as needed
        if let Err(e) = self.insert_routed(&score, addr) {
            warn!(%score, addr, error = %e, "indexing failed, discarding record");
            self.log.discard_from(addr)?;
            return Err(e);
        }
        Ok(score)
    }

    /// Fetch the type and bytes stored under `score`
    pub fn read(&mut self, score: &Score) -> Result<(ChunkType, Vec<u8>)> {
        let (_, bucket_id) = self.trie.route(score);
        let candidates = self.index.bucket(bucket_id)?.lookup(score);
        for addr in candidates {
            match self.log.read(score, addr) {
                Ok(found) => return Ok(found),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::NotFound(*score))
    }

    /// Whether a chunk with this score is stored, and its type
    pub fn lookup(&mut self, score: &Score) -> Result<Option<ChunkType>> {
        let (_, bucket_id) = self.trie.route(score);
        let candidates = self.index.bucket(bucket_id)?.lookup(score);
        for addr in candidates {
            match self.log.verify(score, addr) {
                Ok(t) => return Ok(Some(t)),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Record `addr` under `score` in the bucket the trie routes it to
    ///
    /// A full bucket is split and the insert retried. Each split consumes
    /// one more score bit, so the loop ends once the stored score width is
    /// exhausted.
    fn insert_routed(&mut self, score: &Score, addr: u64) -> Result<()> {
        let max_splits = self.config.score_width * 8;
        for _ in 0..=max_splits {
            let (node, bucket_id) = self.trie.route(score);
            let bucket = self.index.bucket_mut(bucket_id)?;
            let (prefix, bits) = bucket.common_prefix();
            if !score.matches(&prefix, bits) {
                return Err(Error::corruption(format!(
                    "trie routes {} to bucket {} whose prefix does not match",
                    score, bucket_id
                )));
            }
            if bucket.insert(score, addr) {
                return Ok(());
            }
            self.split_bucket(node, bucket_id)?;
        }
        Err(Error::CapacityExceeded(format!(
            "index exhausted: no room for {} after {} splits",
            score, max_splits
        )))
    }

    /// Split the full bucket at trie leaf `node`
    ///
    /// The zero side keeps `bucket_id`, the one side gets a new bucket.
    /// Nothing changes unless the allocation succeeds.
    fn split_bucket(&mut self, node: usize, bucket_id: u32) -> Result<()> {
        let bucket = self.index.bucket(bucket_id)?;
        if bucket.prefix_bits() != depth_of(node) {
            return Err(Error::corruption(format!(
                "bucket {} has a {}-bit prefix but sits at trie depth {}",
                bucket_id,
                bucket.prefix_bits(),
                depth_of(node)
            )));
        }
        let (left, right) = bucket.split()?;

        let (right_prefix, bits) = right.common_prefix();
        let right_id = self
            .index
            .allocate(bits, &right_prefix.as_bytes()[..bits.div_ceil(8)])?;
        info!(
            bucket = bucket_id,
            sibling = right_id,
            prefix_bits = bits,
            left = left.len(),
            right = right.len(),
            "bucket split"
        );
        self.index.replace(right_id, right)?;
        self.index.replace(bucket_id, left)?;
        self.trie.split(node, right_id)?;
        Ok(())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn trie(&self) -> &RoutingTrie {
        &self.trie
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn log(&self) -> &ContentLog {
        &self.log
    }

    /// Store directory, if persistent
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }
}

impl Store<BucketIndex> {
    /// Create a store that lives entirely in memory
    pub fn in_memory(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let index = BucketIndex::new(config.score_width, config.max_buckets);
        let mut log = ContentLog::open(Box::new(MemoryBuffer::new()))?;
        log.set_sync_on_write(config.sync_on_write);
        Self::with_parts(config, index, log)
    }

    /// Initialize a new store directory
    pub fn create(dir: &Path, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        if dir.join(CONFIG_FILE).exists() {
            return Err(Error::InvalidState(format!(
                "store already initialized at {}",
                dir.display()
            )));
        }
        fs::create_dir_all(dir)?;
        config.save(&dir.join(CONFIG_FILE))?;

        let index = BucketIndex::new(config.score_width, config.max_buckets);
        let mut log = ContentLog::open(Box::new(FileStore::open(&dir.join(LOG_FILE))?))?;
        log.set_sync_on_write(config.sync_on_write);
        let mut store = Self::with_parts(config, index, log)?;
        store.root = Some(dir.to_path_buf());
        store.sync()?;
        info!(dir = %dir.display(), "store created");
        Ok(store)
    }

    /// Open an existing store directory
    ///
    /// Validates the trie against the index and re-indexes any log records
    /// written after the last sync. A trie that is unreadable or disagrees
    /// with the index (a crash between the two renames of [`Store::sync`])
    /// is rebuilt from the buckets' common prefixes.
    pub fn open(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(Error::InvalidState(format!(
                "no store at {} (missing {})",
                dir.display(),
                CONFIG_FILE
            )));
        }
        let config = StoreConfig::load(&config_path)?;

        let index = BucketIndex::read_from(
            &mut File::open(dir.join(INDEX_FILE))?,
            config.score_width,
            config.max_buckets,
        )?;
        let mut rebuilt = false;
        let trie = match RoutingTrie::read_from(&mut File::open(dir.join(TRIE_FILE))?) {
            Ok(trie) => trie,
            Err(Error::Corruption(reason)) => {
                warn!(%reason, "routing trie unreadable, rebuilding from bucket prefixes");
                rebuilt = true;
                trie_from_index(&index)?
            }
            Err(e) => return Err(e),
        };
        let mut log = ContentLog::open(Box::new(FileStore::open(&dir.join(LOG_FILE))?))?;
        log.set_sync_on_write(config.sync_on_write);

        let mut store = Self {
            root: Some(dir.to_path_buf()),
            config,
            trie,
            index,
            log,
        };
        if let Err(e) = store.validate_routing() {
            warn!(error = %e, "routing trie disagrees with the bucket index, rebuilding");
            store.trie = trie_from_index(&store.index)?;
            rebuilt = true;
        }
        let recovered = store.reindex_missing()?;
        if recovered > 0 {
            info!(recovered, "re-indexed records written after the last sync");
        }
        if rebuilt || recovered > 0 {
            store.sync()?;
        }
        info!(
            dir = %dir.display(),
            buckets = store.index.len(),
            records = store.log.record_count(),
            "store opened"
        );
        Ok(store)
    }

    /// Persist the trie and index, and flush the log
    pub fn sync(&mut self) -> Result<()> {
        self.log.sync()?;
        if let Some(root) = &self.root {
            let mut trie = Vec::with_capacity(self.trie.len() * 4);
            self.trie.write_to(&mut trie)?;
            atomic_write(&root.join(TRIE_FILE), &trie)?;

            let mut index = Vec::with_capacity(self.index.len() * crate::bucket::BUCKET_SIZE);
            self.index.write_to(&mut index)?;
            atomic_write(&root.join(INDEX_FILE), &index)?;
            debug!(root = %root.display(), "store synced");
        }
        Ok(())
    }

    /// Sync and release the store
    pub fn close(mut self) -> Result<()> {
        self.sync()?;
        self.log.close()
    }

    /// Every trie leaf must name a known bucket whose prefix spells the
    /// leaf's path, and every bucket must be a leaf
    fn validate_routing(&self) -> Result<()> {
        let leaves = self.trie.leaves();
        if leaves.len() != self.index.len() {
            return Err(Error::corruption(format!(
                "routing trie has {} leaves for {} buckets",
                leaves.len(),
                self.index.len()
            )));
        }
        for (node, depth, bucket_id) in leaves {
            let bucket = self.index.bucket(bucket_id)?;
            let expected = (path_of(node), depth);
            if bucket.common_prefix() != expected {
                return Err(Error::corruption(format!(
                    "trie leaf {} (depth {}) points at bucket {} with a {}-bit prefix {}",
                    node,
                    depth,
                    bucket_id,
                    bucket.prefix_bits(),
                    bucket.common_prefix().0
                )));
            }
        }
        Ok(())
    }

    /// Index log records that no bucket points at
    fn reindex_missing(&mut self) -> Result<usize> {
        let mut recovered = 0;
        for record in self.log.records()? {
            let (_, bucket_id) = self.trie.route(&record.score);
            if self
                .index
                .bucket(bucket_id)?
                .lookup(&record.score)
                .contains(&record.addr)
            {
                continue;
            }
            self.insert_routed(&record.score, record.addr)?;
            recovered += 1;
        }
        Ok(recovered)
    }

    /// Bucket, trie and log totals
    pub fn stats(&self) -> StoreStats {
        let fills: Vec<usize> = self.index.iter().map(|(_, b)| b.len()).collect();
        let entries: usize = fills.iter().sum();
        StoreStats {
            buckets: fills.len(),
            entries,
            min_fill: fills.iter().copied().min().unwrap_or(0),
            max_fill: fills.iter().copied().max().unwrap_or(0),
            mean_fill: if fills.is_empty() {
                0.0
            } else {
                entries as f64 / fills.len() as f64
            },
            trie_slots: self.trie.len(),
            trie_depth: self.trie.max_depth(),
            log_bytes: self.log.len(),
            records: self.log.record_count(),
        }
    }

    /// Cross-check the log against the index
    ///
    /// Every record must be reachable through routing, and every bucket
    /// entry must point at the start of a record whose score agrees with
    /// the stored partial score. Returns the number of records checked.
    pub fn check(&mut self) -> Result<usize> {
        let records = self.log.records()?;
        let by_addr: HashMap<u64, Score> = records.iter().map(|r| (r.addr, r.score)).collect();

        for record in &records {
            let (_, bucket_id) = self.trie.route(&record.score);
            if !self
                .index
                .bucket(bucket_id)?
                .lookup(&record.score)
                .contains(&record.addr)
            {
                return Err(Error::corruption(format!(
                    "record {} at {} is not reachable through bucket {}",
                    record.score, record.addr, bucket_id
                )));
            }
        }

        let mask = self.config.score_width * 8;
        for (bucket_id, bucket) in self.index.iter() {
            for (partial, addr) in bucket.entries() {
                match by_addr.get(&addr) {
                    Some(full) if full.matches(&partial, mask) => {}
                    Some(full) => {
                        return Err(Error::corruption(format!(
                            "bucket {} entry {} points at record {}",
                            bucket_id, partial, full
                        )))
                    }
                    None => {
                        return Err(Error::corruption(format!(
                            "bucket {} entry points at {}, which is not a record",
                            bucket_id, addr
                        )))
                    }
                }
            }
        }
        Ok(records.len())
    }

    /// Routing leaves with their buckets, left to right
    pub fn leaves(&self) -> Vec<(String, u32, &Bucket)> {
        self.trie
            .leaves()
            .into_iter()
            .filter_map(|(node, depth, id)| {
                let path = path_of(node);
                let bits: String = (0..depth)
                    .map(|b| if path.bit(b) { '1' } else { '0' })
                    .collect();
                self.index.bucket(id).ok().map(|bucket| (bits, id, bucket))
            })
            .collect()
    }
}

impl<I> fmt::Debug for Store<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("trie_slots", &self.trie.len())
            .field("log", &self.log)
            .finish()
    }
}

/// Routing trie whose leaves are exactly the index's buckets
fn trie_from_index(index: &BucketIndex) -> Result<RoutingTrie> {
    RoutingTrie::from_prefixes(index.iter().map(|(id, bucket)| {
        let (prefix, bits) = bucket.common_prefix();
        (id, prefix, bits)
    }))
}

/// Score bits spelled by the path from the root to node `k`
fn path_of(mut k: usize) -> Score {
    let depth = depth_of(k);
    let mut bytes = [0u8; crate::score::SCORE_SIZE];
    for b in (0..depth).rev() {
        // Right children sit at even indices
        if k % 2 == 0 {
            bytes[b / 8] |= 0x80 >> (b % 8);
        }
        k = (k - 1) / 2;
    }
    Score::from_bytes(bytes)
}

/// Store totals
#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub buckets: usize,
    pub entries: usize,
    pub min_fill: usize,
    pub max_fill: usize,
    pub mean_fill: f64,
    pub trie_slots: usize,
    pub trie_depth: usize,
    pub log_bytes: u64,
    pub records: u64,
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "records:  {} ({} bytes)", self.records, self.log_bytes)?;
        writeln!(
            f,
            "buckets:  {} holding {} entries (min={}, mean={:.1}, max={})",
            self.buckets, self.entries, self.min_fill, self.mean_fill, self.max_fill
        )?;
        write!(f, "trie:     {} slots, depth {}", self.trie_slots, self.trie_depth)
    }
}

/// Atomic write helper
///
/// Writes data to a sibling temporary file, fsyncs it, then renames it over
/// the target path.
pub fn atomic_write(target: &Path, data: &[u8]) -> Result<()> {
    let tmp = target.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, target)?;
    #[cfg(unix)]
    if let Some(parent) = target.parent() {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytestore::MemoryBuffer;

    fn memory_store(score_width: usize) -> Store {
        Store::in_memory(StoreConfig {
            score_width,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_write_read_roundtrip() {
        let mut store = memory_store(10);
        let score = store.write(ChunkType(1), b"hello world").unwrap();
        assert_eq!(score, Score::compute(b"hello world"));
        assert_eq!(
            store.read(&score).unwrap(),
            (ChunkType(1), b"hello world".to_vec())
        );
        assert_eq!(store.lookup(&score).unwrap(), Some(ChunkType(1)));
    }

    #[test]
    fn test_empty_chunk() {
        let mut store = memory_store(10);
        let score = store.write(ChunkType(0), b"").unwrap();
        assert_eq!(store.read(&score).unwrap(), (ChunkType(0), Vec::new()));
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let mut store = memory_store(10);
        let s1 = store.write(ChunkType(2), b"same bytes").unwrap();
        let len = store.log().len();
        let s2 = store.write(ChunkType(2), b"same bytes").unwrap();
        assert_eq!(s1, s2);
        assert_eq!(store.log().len(), len);
        assert_eq!(store.log().record_count(), 1);
    }

    #[test]
    fn test_type_conflict_leaves_log_unchanged() {
        let mut store = memory_store(10);
        store.write(ChunkType(1), b"typed").unwrap();
        let len = store.log().len();
        let err = store.write(ChunkType(2), b"typed").unwrap_err();
        assert!(matches!(
            err,
            Error::TypeConflict {
                existing: ChunkType(1),
                requested: ChunkType(2),
                ..
            }
        ));
        assert_eq!(store.log().len(), len);
    }

    #[test]
    fn test_missing_score_not_found() {
        let mut store = memory_store(10);
        store.write(ChunkType(0), b"present").unwrap();
        let missing = Score::compute(b"absent");
        assert!(store.read(&missing).unwrap_err().is_not_found());
        assert_eq!(store.lookup(&missing).unwrap(), None);
    }

    #[test]
    fn test_partial_score_collisions_are_verified() {
        // One stored score byte: many chunks share a partial score
        let mut store = memory_store(1);
        let mut scores = Vec::new();
        for i in 0..600u32 {
            scores.push((i, store.write(ChunkType(0), &i.to_le_bytes()).unwrap()));
        }
        for (i, s) in scores {
            assert_eq!(store.read(&s).unwrap().1, i.to_le_bytes());
        }
    }

    #[test]
    fn test_buckets_split_when_full() {
        let mut store = memory_store(10);
        for i in 0..3000u32 {
            store.write(ChunkType(0), &i.to_be_bytes()).unwrap();
        }
        let stats = store.stats();
        assert!(stats.buckets > 1);
        assert_eq!(stats.entries, 3000);
        assert_eq!(stats.records, 3000);
        assert!(stats.trie_depth >= 1);
        assert_eq!(store.check().unwrap(), 3000);

        for i in 0..3000u32 {
            let s = Score::compute(&i.to_be_bytes());
            assert_eq!(store.read(&s).unwrap().1, i.to_be_bytes());
        }
    }

    #[test]
    fn test_max_buckets_discards_unindexed_record() {
        let mut store = Store::in_memory(StoreConfig {
            max_buckets: 1,
            ..Default::default()
        })
        .unwrap();
        let mut last_err = None;
        for i in 0..2000u32 {
            match store.write(ChunkType(0), &i.to_be_bytes()) {
                Ok(_) => {}
                Err(e) => {
                    last_err = Some(e);
                    break;
                }
            }
        }
        assert!(matches!(last_err, Some(Error::CapacityExceeded(_))));
        // The rejected record was rolled back
        assert_eq!(store.log().record_count() as usize, store.stats().entries);
        assert_eq!(store.check().unwrap(), store.stats().entries);
    }

    #[test]
    fn test_generic_over_index_capabilities() {
        /// Index double that counts allocations
        struct Counting {
            inner: BucketIndex,
            allocations: usize,
        }
        impl AllocateBucket for Counting {
            fn allocate(&mut self, bits: usize, prefix: &[u8]) -> Result<u32> {
                self.allocations += 1;
                self.inner.allocate(bits, prefix)
            }
        }
        impl ProvideBucket for Counting {
            fn bucket(&self, id: u32) -> Result<&Bucket> {
                self.inner.bucket(id)
            }
            fn bucket_mut(&mut self, id: u32) -> Result<&mut Bucket> {
                self.inner.bucket_mut(id)
            }
        }

        let config = StoreConfig::default();
        let index = Counting {
            inner: BucketIndex::new(config.score_width, 0),
            allocations: 0,
        };
        let log = ContentLog::open(Box::new(MemoryBuffer::new())).unwrap();
        let mut store = Store::with_parts(config, index, log).unwrap();
        assert_eq!(store.index().allocations, 1);

        for i in 0..2000u32 {
            store.write(ChunkType(0), &i.to_be_bytes()).unwrap();
        }
        assert!(store.index().allocations > 1);
        assert_eq!(store.index().allocations, store.index().inner.len());
    }

    #[test]
    fn test_path_of() {
        assert_eq!(path_of(0), Score::ZERO);
        assert_eq!(path_of(2), Score::from_prefix(&[0x80]));
        assert_eq!(path_of(5), Score::from_prefix(&[0x80]));
        assert_eq!(path_of(6), Score::from_prefix(&[0xC0]));
        assert_eq!(path_of(4), Score::from_prefix(&[0x40]));
    }

    #[test]
    fn test_create_open_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("store");

        let mut scores = Vec::new();
        {
            let mut store = Store::create(&dir, StoreConfig::default()).unwrap();
            for i in 0..1500u32 {
                scores.push(store.write(ChunkType(3), &i.to_be_bytes()).unwrap());
            }
            store.close().unwrap();
        }

        let mut store = Store::open(&dir).unwrap();
        assert_eq!(store.log().record_count(), 1500);
        for (i, s) in scores.iter().enumerate() {
            assert_eq!(store.read(s).unwrap(), (ChunkType(3), (i as u32).to_be_bytes().to_vec()));
        }
        assert_eq!(store.check().unwrap(), 1500);

        assert!(matches!(
            Store::create(&dir, StoreConfig::default()),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_open_reindexes_unsynced_records() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("store");

        let score = {
            let mut store = Store::create(&dir, StoreConfig::default()).unwrap();
            store.write(ChunkType(0), b"synced").unwrap();
            store.sync().unwrap();
            // Written to the log, never synced into the index
            let s = store.write(ChunkType(0), b"unsynced").unwrap();
            store.log.sync().unwrap();
            s
        };

        let mut store = Store::open(&dir).unwrap();
        assert_eq!(store.read(&score).unwrap().1, b"unsynced");
        assert_eq!(store.check().unwrap(), 2);
    }

    #[test]
    fn test_atomic_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let target = temp_dir.path().join("index.bin");
        atomic_write(&target, b"first").unwrap();
        atomic_write(&target, b"second").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"second");
        assert!(!target.with_extension("tmp").exists());
    }

    /// Store with `first` chunks synced, then `total` chunks closed, plus
    /// the trie and index file contents as of the first sync
    fn store_with_stale_snapshot(dir: &Path, first: u32, total: u32) -> (Vec<u8>, Vec<u8>) {
        let mut store = Store::create(dir, StoreConfig::default()).unwrap();
        for i in 0..first {
            store.write(ChunkType(0), &i.to_be_bytes()).unwrap();
        }
        store.sync().unwrap();
        let trie = fs::read(dir.join(TRIE_FILE)).unwrap();
        let index = fs::read(dir.join(INDEX_FILE)).unwrap();
        for i in first..total {
            store.write(ChunkType(0), &i.to_be_bytes()).unwrap();
        }
        assert!(store.stats().buckets > 1);
        store.close().unwrap();
        (trie, index)
    }

    fn assert_all_readable(store: &mut Store, total: u32) {
        for i in 0..total {
            let s = Score::compute(&i.to_be_bytes());
            assert_eq!(store.read(&s).unwrap().1, i.to_be_bytes());
        }
    }

    #[test]
    fn test_open_recovers_new_trie_with_old_index() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("store");
        let (_, old_index) = store_with_stale_snapshot(&dir, 100, 2000);

        // Crash after the trie rename, before the index rename
        fs::write(dir.join(INDEX_FILE), old_index).unwrap();

        let mut store = Store::open(&dir).unwrap();
        assert_eq!(store.check().unwrap(), 2000);
        assert_all_readable(&mut store, 2000);
        store.close().unwrap();

        // The repaired trie and index were persisted
        let mut store = Store::open(&dir).unwrap();
        assert_eq!(store.check().unwrap(), 2000);
    }

    #[test]
    fn test_open_recovers_old_trie_with_new_index() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("store");
        let (old_trie, _) = store_with_stale_snapshot(&dir, 100, 2000);
        let buckets = Store::open(&dir).unwrap().stats().buckets;

        fs::write(dir.join(TRIE_FILE), old_trie).unwrap();

        let mut store = Store::open(&dir).unwrap();
        assert_eq!(store.stats().buckets, buckets);
        assert_eq!(store.check().unwrap(), 2000);
        assert_all_readable(&mut store, 2000);
    }

    #[test]
    fn test_open_rebuilds_unreadable_trie() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("store");
        store_with_stale_snapshot(&dir, 10, 1000);

        fs::write(dir.join(TRIE_FILE), [0xFF, 0xFF, 0xFF]).unwrap();

        let mut store = Store::open(&dir).unwrap();
        assert_eq!(store.check().unwrap(), 1000);
    }

    #[test]
    fn test_open_missing_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Store::open(&temp_dir.path().join("nope")),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_open_rejects_overlapping_buckets() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("store");
        let mut store = Store::create(&dir, StoreConfig::default()).unwrap();
        store.write(ChunkType(0), b"chunk").unwrap();
        store.close().unwrap();

        // Two root buckets: no trie can route to both
        let mut index = BucketIndex::new(StoreConfig::default().score_width, 0);
        index.allocate(0, &[]).unwrap();
        index.allocate(0, &[]).unwrap();
        let mut bytes = Vec::new();
        index.write_to(&mut bytes).unwrap();
        fs::write(dir.join(INDEX_FILE), bytes).unwrap();

        assert!(matches!(Store::open(&dir), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_leaves_listing() {
        let mut store = memory_store(10);
        for i in 0..1000u32 {
            store.write(ChunkType(0), &i.to_be_bytes()).unwrap();
        }
        let leaves = store.leaves();
        assert_eq!(leaves.len(), store.stats().buckets);
        let total: usize = leaves.iter().map(|(_, _, b)| b.len()).sum();
        assert_eq!(total, 1000);
        for (bits, _, bucket) in &leaves {
            assert_eq!(bits.len(), bucket.prefix_bits());
        }
    }
}
