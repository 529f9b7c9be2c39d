use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

mod admission;
mod codec;
mod entry;
mod handle;
mod index;
mod key;
mod manifest;
mod request;
mod store;

pub use admission::{OfflineSkipReason, OfflineStorePlan, plan_offline_store};
pub use codec::{SplitEntry, decode, decode_split, encode, encode_split};
pub use entry::{CachedEntry, ResponseMetadata, UserInfo, UserValue};
pub use handle::AsyncDiskCache;
pub use key::{CacheKey, normalize_url};
pub use request::CacheRequest;
pub use store::{DATA_SUFFIX, RESPONSE_SUFFIX, SplitPaths, USER_INFO_SUFFIX};

pub mod fuzzing {
    use super::manifest::Manifest;

    /// Parses and validates manifest bytes, returning how many keys survive.
    pub fn parse_manifest(data: &[u8]) -> Option<usize> {
        Manifest::parse(data)
            .ok()
            .map(|manifest| manifest.validate().entries.len())
    }
}

use index::CacheIndex;
use manifest::Manifest;
use store::CacheStore;

use crate::error::CacheResult;

pub const DEFAULT_MAX_SIZE: u64 = 50 * 1024 * 1024;

/// On-disk arrangement of entries, fixed for the lifetime of a cache instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLayout {
    /// One file per entry holding metadata, body and user info.
    #[default]
    Combined,
    /// Three files per entry so the body can be written as its own step.
    Split,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub root: PathBuf,
    pub max_size: u64,
    pub layout: CacheLayout,
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_size: DEFAULT_MAX_SIZE,
            layout: CacheLayout::default(),
        }
    }

    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn layout(mut self, layout: CacheLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// Where the file(s) of one entry live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPaths {
    Combined(PathBuf),
    Split(SplitPaths),
}

impl EntryPaths {
    pub fn files(&self) -> Vec<&Path> {
        match self {
            EntryPaths::Combined(path) => vec![path.as_path()],
            EntryPaths::Split(paths) => paths.all().to_vec(),
        }
    }
}

/// Result of a successful store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreReport {
    pub key: CacheKey,
    /// Bytes written for the entry, summed over all of its files.
    pub size: u64,
    /// Size of the entry this store replaced, if the key was already cached.
    pub replaced_size: Option<u64>,
    /// Keys evicted to get back under the size bound, oldest first. May include `key`.
    pub evicted: Vec<CacheKey>,
}

impl StoreReport {
    /// False when the new entry was itself evicted by the same store.
    pub fn retained(&self) -> bool {
        !self.evicted.contains(&self.key)
    }
}

/// Size-bounded disk cache with oldest-first eviction.
///
/// Mutations hold the index write lock for the whole write, evict and persist
/// sequence. Reads share the read lock, so a reader never sees a file that is
/// being replaced.
#[derive(Debug)]
pub struct DiskCache {
    store: CacheStore,
    max_size: u64,
    layout: CacheLayout,
    index: RwLock<CacheIndex>,
}

impl DiskCache {
    pub fn open(config: CacheConfig) -> CacheResult<Self> {
        let CacheConfig {
            root,
            max_size,
            layout,
        } = config;
        let store = CacheStore::open(root)?;
        let cache = Self {
            store,
            max_size,
            layout,
            index: RwLock::new(CacheIndex::new()),
        };

        {
            let mut index = cache.index.write();
            let dropped = cache.restore_locked(&mut index);
            let evicted = cache.evict_locked(&mut index);
            if dropped > 0 || !evicted.is_empty() {
                cache.persist_locked(&index);
            }
            crate::metrics::set_cache_usage(index.current_size(), index.len());
            info!(
                root = %cache.store.root().display(),
                entries = index.len(),
                bytes = index.current_size(),
                max_size,
                layout = ?layout,
                "disk cache opened"
            );
        }
        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    pub fn layout(&self) -> CacheLayout {
        self.layout
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.store.manifest_path()
    }

    pub fn current_size(&self) -> u64 {
        self.index.read().current_size()
    }

    /// Tracked keys, oldest first.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.index.read().keys()
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    /// Bytes accounted for the entry of `request`, if it is tracked.
    pub fn entry_size(&self, request: &CacheRequest) -> Option<u64> {
        self.index.read().size_of(&request.key())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path_for_key(&self, key: &CacheKey) -> EntryPaths {
        match self.layout {
            CacheLayout::Combined => EntryPaths::Combined(self.store.entry_path(key)),
            CacheLayout::Split => EntryPaths::Split(self.store.split_paths(key)),
        }
    }

    pub fn path_for_request(&self, request: &CacheRequest) -> EntryPaths {
        self.path_for_key(&request.key())
    }

    /// Writes an entry for `request`, replacing any previous one, then evicts
    /// the oldest entries until the cache fits in `max_size`.
    ///
    /// On error the index is unchanged, except that a split entry whose parts
    /// were only partly replaced is dropped.
    pub fn store(
        &self,
        request: &CacheRequest,
        metadata: &ResponseMetadata,
        body: &[u8],
        user_info: Option<&UserInfo>,
    ) -> CacheResult<StoreReport> {
        let key = request.key();
        let mut index = self.index.write();
        let size = match self.write_entry_locked(&mut index, &key, metadata, body, user_info) {
            Ok(size) => size,
            Err(err) => {
                crate::metrics::record_cache_store_error();
                warn!(key = %key, url = %request.uri, error = %err, "failed to store cache entry");
                return Err(err);
            }
        };

        let replaced_size = index.insert(key.clone(), size);
        let evicted = self.evict_locked(&mut index);
        self.persist_locked(&index);

        crate::metrics::record_cache_store();
        crate::metrics::set_cache_usage(index.current_size(), index.len());
        trace!(
            key = %key,
            url = %request.uri,
            size,
            replaced = replaced_size.is_some(),
            evicted = evicted.len(),
            "stored cache entry"
        );
        Ok(StoreReport {
            key,
            size,
            replaced_size,
            evicted,
        })
    }

    /// Stores only responses the offline admission plan accepts.
    pub fn store_offline(
        &self,
        request: &CacheRequest,
        metadata: &ResponseMetadata,
        body: &[u8],
        user_info: Option<&UserInfo>,
    ) -> CacheResult<Option<StoreReport>> {
        match plan_offline_store(request, metadata) {
            OfflineStorePlan::Store => self.store(request, metadata, body, user_info).map(Some),
            plan => {
                trace!(url = %request.uri, plan = ?plan, "not storing response offline");
                Ok(None)
            }
        }
    }

    /// Returns the entry for `request`. Missing, unreadable and corrupt entries
    /// are all misses; a corrupt file is left where it is.
    pub fn retrieve(&self, request: &CacheRequest) -> Option<CachedEntry> {
        let key = request.key();
        let index = self.index.read();
        if !index.contains(&key) {
            crate::metrics::record_cache_lookup(false);
            trace!(key = %key, url = %request.uri, "cache miss");
            return None;
        }

        match self.read_entry(&key) {
            Ok(entry) => {
                crate::metrics::record_cache_lookup(true);
                trace!(key = %key, url = %request.uri, "cache hit");
                Some(entry)
            }
            Err(err) => {
                crate::metrics::record_cache_lookup(false);
                if err.is_not_found() {
                    debug!(key = %key, error = %err, "tracked cache entry missing on disk");
                } else {
                    warn!(key = %key, error = %err, "unreadable cache entry treated as miss");
                }
                None
            }
        }
    }

    /// Whether a tracked entry exists on disk for `request`. Does not decode it.
    pub fn has_entry(&self, request: &CacheRequest) -> bool {
        let key = request.key();
        let index = self.index.read();
        index.contains(&key)
            && self
                .path_for_key(&key)
                .files()
                .into_iter()
                .all(|path| self.store.exists(path))
    }

    /// Deletes the entry for `request`. Returns false if there was none.
    pub fn remove(&self, request: &CacheRequest) -> CacheResult<bool> {
        let key = request.key();
        let mut index = self.index.write();
        if !index.contains(&key) {
            return Ok(false);
        }
        self.remove_files(&key)?;
        index.remove(&key);
        self.persist_locked(&index);
        crate::metrics::set_cache_usage(index.current_size(), index.len());
        debug!(key = %key, url = %request.uri, "removed cache entry");
        Ok(true)
    }

    /// Deletes every tracked entry and the manifest.
    ///
    /// Entries whose files could not be deleted stay tracked, and the first
    /// such error is returned.
    pub fn clear(&self) -> CacheResult<()> {
        let mut index = self.index.write();
        let mut failed = Vec::new();
        let mut first_error = None;
        for (key, size) in index.entries() {
            if let Err(err) = self.remove_files(&key) {
                warn!(key = %key, error = %err, "failed to delete cache entry during clear");
                failed.push((key, size));
                first_error.get_or_insert(err);
            }
        }

        index.reset();
        for (key, size) in failed {
            index.insert(key, size);
        }
        crate::metrics::set_cache_usage(index.current_size(), index.len());

        if let Some(err) = first_error {
            self.persist_locked(&index);
            return Err(err);
        }
        self.store.remove_file(&self.store.manifest_path())?;
        info!(root = %self.store.root().display(), "disk cache cleared");
        Ok(())
    }

    fn write_entry_locked(
        &self,
        index: &mut CacheIndex,
        key: &CacheKey,
        metadata: &ResponseMetadata,
        body: &[u8],
        user_info: Option<&UserInfo>,
    ) -> CacheResult<u64> {
        match self.layout {
            CacheLayout::Combined => {
                let encoded = codec::encode(metadata, body, user_info)?;
                self.store
                    .write_atomic(&self.store.entry_path(key), &encoded)?;
                Ok(encoded.len() as u64)
            }
            CacheLayout::Split => {
                let split = codec::encode_split(metadata, body, user_info)?;
                self.write_split_locked(index, key, &split)?;
                Ok(split.len())
            }
        }
    }

    /// Writes all three parts to temp files before renaming any of them, so an
    /// I/O failure while writing leaves the previous entry untouched.
    fn write_split_locked(
        &self,
        index: &mut CacheIndex,
        key: &CacheKey,
        split: &SplitEntry,
    ) -> CacheResult<()> {
        let paths = self.store.split_paths(key);
        let parts = [
            (&split.response, &paths.response),
            (&split.data, &paths.data),
            (&split.user_info, &paths.user_info),
        ];

        let mut temps = Vec::with_capacity(parts.len());
        for (data, _) in &parts {
            match self.store.write_temp(data) {
                Ok(temp) => temps.push(temp),
                Err(err) => {
                    for temp in &temps {
                        self.store.discard_temp(temp);
                    }
                    return Err(err);
                }
            }
        }

        for (i, (temp, (_, final_path))) in temps.iter().zip(parts.iter()).enumerate() {
            if let Err(err) = self.store.commit(temp, final_path) {
                for leftover in &temps[i + 1..] {
                    self.store.discard_temp(leftover);
                }
                // Some parts may already be replaced; the old entry is gone either way.
                if let Err(cleanup) = self.remove_files(key) {
                    warn!(key = %key, error = %cleanup, "failed to clean up partial split entry");
                }
                if index.remove(key).is_some() {
                    self.persist_locked(index);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn read_entry(&self, key: &CacheKey) -> CacheResult<CachedEntry> {
        match self.path_for_key(key) {
            EntryPaths::Combined(path) => {
                let data = self.store.read(&path)?;
                codec::decode(Bytes::from(data))
            }
            EntryPaths::Split(paths) => {
                let response = self.store.read(&paths.response)?;
                let data = self.store.read(&paths.data)?;
                let user_info = self.store.read(&paths.user_info)?;
                codec::decode_split(&response, Bytes::from(data), &user_info)
            }
        }
    }

    /// Deletes every file of `key`. Missing files are not an error.
    fn remove_files(&self, key: &CacheKey) -> CacheResult<()> {
        let paths = self.path_for_key(key);
        let mut first_error = None;
        for path in paths.files() {
            if let Err(err) = self.store.remove_file(path) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn on_disk_size(&self, key: &CacheKey) -> Option<u64> {
        self.path_for_key(key)
            .files()
            .into_iter()
            .map(|path| self.store.file_len(path))
            .sum()
    }

    fn evict_locked(&self, index: &mut CacheIndex) -> Vec<CacheKey> {
        let mut evicted = Vec::new();
        while index.exceeds(self.max_size) {
            let Some((key, size)) = index.pop_oldest() else {
                break;
            };
            if let Err(err) = self.remove_files(&key) {
                warn!(key = %key, error = %err, "failed to delete evicted cache entry");
            }
            crate::metrics::record_cache_eviction(size);
            debug!(key = %key, size, remaining = index.current_size(), "evicted cache entry");
            evicted.push(key);
        }
        evicted
    }

    fn persist_locked(&self, index: &CacheIndex) {
        let manifest = Manifest::from_entries(index.current_size(), &index.entries());
        let data = match manifest.to_bytes() {
            Ok(data) => data,
            Err(err) => {
                warn!(error = %err, "failed to serialize cache manifest");
                return;
            }
        };
        if let Err(err) = self.store.write_atomic(&self.store.manifest_path(), &data) {
            warn!(error = %err, "failed to persist cache manifest; stale until the next write");
        }
    }

    /// Rebuilds the index from the manifest. Keys whose files are gone are
    /// dropped; returns how many were.
    fn restore_locked(&self, index: &mut CacheIndex) -> usize {
        let loaded = manifest::load(&self.store.manifest_path());
        index.reset();
        let mut dropped = 0;
        for (key, recorded) in loaded.entries {
            let Some(on_disk) = self.on_disk_size(&key) else {
                warn!(key = %key, "dropping cache entry whose files are missing");
                if let Err(err) = self.remove_files(&key) {
                    warn!(key = %key, error = %err, "failed to delete partial cache entry");
                }
                dropped += 1;
                continue;
            };
            index.insert(key, recorded.unwrap_or(on_disk));
        }
        if dropped == 0 && index.current_size() != loaded.current_size {
            warn!(
                manifest_size = loaded.current_size,
                entry_sizes = index.current_size(),
                "cache manifest size disagrees with its entries; using entry sizes"
            );
        }
        dropped
    }
}
