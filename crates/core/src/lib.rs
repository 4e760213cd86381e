//! Photolala core: a local photo catalog with content-addressed CSV
//! snapshots, a digest/processing pipeline, and push-style sync to an
//! S3-like object store.
//!
//! [`Library`] is the single entry point. It owns the catalog, the snapshot
//! store under `<root>/.photolala/`, the thumbnail and metadata caches, and
//! serializes all catalog mutation behind one lock.

pub mod cache;
pub mod catalog;
pub mod domain;
pub mod error;
pub mod exif;
pub mod hasher;
pub mod pipeline;
pub mod scanner;
pub mod snapshot;
pub mod sync;
pub mod thumbnail;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info};

pub use cache::{CachedCatalog, MetadataCache, ThumbnailCache};
pub use catalog::CatalogDatabase;
pub use domain::{
    CatalogEntry, FastKey, LibraryStats, PhotoFormat, PhotoItem, PhotoMetadata,
};
pub use error::{Error, Result};
pub use hasher::HashAlgorithm;
pub use pipeline::{CancelToken, FileFailure, ProcessProgress, ProcessReport};
pub use snapshot::{SnapshotInfo, SnapshotStore};
pub use sync::{
    FsObjectStore, MemoryObjectStore, ObjectStore, SyncItemResult, SyncReport, SyncService,
    SyncStatus,
};
pub use thumbnail::GeneratedThumbnail;

/// Name of the metadata directory kept inside the library root.
pub const METADATA_DIR: &str = ".photolala";

/// Lock a mutex, recovering the guard if a worker thread panicked while
/// holding it. The catalog types hold no invariants a panic can corrupt.
pub(crate) fn lock_mutex<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Tunables for a [`Library`] instance.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// Files per sequential pipeline batch.
    pub batch_size: usize,
    /// Parallel workers within a batch.
    pub workers: usize,
    /// TTL for the decoded-catalog and metadata read caches.
    pub cache_ttl: Duration,
    /// Snapshots retained by [`Library::prune_snapshots`] when called with
    /// no explicit count.
    pub snapshot_keep: usize,
    pub hash_algorithm: HashAlgorithm,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            workers: 4,
            cache_ttl: cache::CATALOG_CACHE_TTL,
            snapshot_keep: 10,
            hash_algorithm: HashAlgorithm::default(),
        }
    }
}

/// A photo library rooted at a directory. All mutation of the catalog flows
/// through this one owner; concurrent processing runs are rejected rather
/// than interleaved.
pub struct Library {
    root: PathBuf,
    config: LibraryConfig,
    catalog: Mutex<CatalogDatabase>,
    snapshots: SnapshotStore,
    thumbnails: ThumbnailCache,
    metadata: Mutex<MetadataCache>,
    read_cache: Mutex<Option<CachedCatalog>>,
    local_paths: Mutex<HashMap<String, PathBuf>>,
    processing: AtomicBool,
}

impl Library {
    /// Open a library with default configuration.
    pub fn open(root: &Path) -> Result<Self> {
        Self::open_with_config(root, LibraryConfig::default())
    }

    /// Open a library, creating the metadata directory if needed and loading
    /// the catalog the current snapshot pointer names. A library that has
    /// never been scanned starts with an empty catalog.
    pub fn open_with_config(root: &Path, config: LibraryConfig) -> Result<Self> {
        if !root.exists() {
            return Err(Error::RootNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(Error::RootNotDirectory(root.to_path_buf()));
        }

        let meta_dir = root.join(METADATA_DIR);
        let snapshots = SnapshotStore::open(&meta_dir, config.hash_algorithm)?;
        let thumbnails = ThumbnailCache::open(&meta_dir.join("thumbnails"))?;

        let catalog = match snapshots.read_current() {
            Ok((info, body)) => {
                debug!(
                    "loaded catalog snapshot {} ({} rows)",
                    info.hash,
                    info.row_count.unwrap_or(0)
                );
                CatalogDatabase::from_csv(&String::from_utf8_lossy(&body))?
            }
            Err(Error::PointerMissing(_)) => CatalogDatabase::new(),
            Err(e) => return Err(e),
        };

        Ok(Self {
            root: root.to_path_buf(),
            metadata: Mutex::new(MetadataCache::new(
                cache::METADATA_CACHE_CAPACITY,
                config.cache_ttl,
            )),
            config,
            catalog: Mutex::new(catalog),
            snapshots,
            thumbnails,
            read_cache: Mutex::new(None),
            local_paths: Mutex::new(HashMap::new()),
            processing: AtomicBool::new(false),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Discover photos under the root, process them, and publish a snapshot
    /// if the catalog changed.
    pub fn scan(
        &self,
        progress: Option<&mut dyn FnMut(ProcessProgress)>,
        cancel: Option<&CancelToken>,
    ) -> Result<ProcessReport> {
        let files = scanner::scan_directory(&self.root)?;
        info!("scan found {} candidate files under {}", files.len(), self.root.display());
        let items: Vec<PhotoItem> = files.into_iter().map(|f| f.into_item()).collect();
        self.process_items(&items, progress, cancel)
    }

    /// Run the pipeline over an explicit item list. Only one run may be in
    /// flight per library; a second concurrent call fails with
    /// [`Error::AlreadyProcessing`].
    pub fn process_items(
        &self,
        items: &[PhotoItem],
        progress: Option<&mut dyn FnMut(ProcessProgress)>,
        cancel: Option<&CancelToken>,
    ) -> Result<ProcessReport> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyProcessing);
        }
        let _guard = ProcessingGuard(&self.processing);

        let pipeline = pipeline::Pipeline {
            catalog: &self.catalog,
            thumbnails: &self.thumbnails,
            metadata: &self.metadata,
            local_paths: &self.local_paths,
            algorithm: self.config.hash_algorithm,
            batch_size: self.config.batch_size,
            workers: self.config.workers,
        };
        let report = pipeline.run(items, progress, cancel)?;

        if lock_mutex(&self.catalog).is_dirty() {
            self.publish_snapshot()?;
        }
        Ok(report)
    }

    /// Export the catalog, publish it as an immutable snapshot, and repoint.
    ///
    /// The catalog lock is held across export, publish, and repoint so that
    /// concurrent publishers cannot interleave: the pointer always names a
    /// snapshot of the table as it was at publish time, never a stale export.
    pub fn publish_snapshot(&self) -> Result<SnapshotInfo> {
        let mut catalog = lock_mutex(&self.catalog);
        let body = catalog.export_csv();
        let info = self.snapshots.publish(body.as_bytes())?;
        catalog.mark_clean();
        drop(catalog);
        *lock_mutex(&self.read_cache) = None;
        info!(
            "published catalog snapshot {} ({} rows)",
            info.hash,
            info.row_count.unwrap_or(0)
        );
        Ok(info)
    }

    pub fn snapshots(&self) -> Result<Vec<SnapshotInfo>> {
        self.snapshots.list()
    }

    pub fn current_snapshot(&self) -> Result<SnapshotInfo> {
        self.snapshots.read_current().map(|(info, _)| info)
    }

    /// Delete old snapshots, keeping `keep` (or the configured default).
    /// The pointer target always survives.
    pub fn prune_snapshots(&self, keep: Option<usize>) -> Result<usize> {
        self.snapshots.prune(keep.unwrap_or(self.config.snapshot_keep))
    }

    pub fn validate_snapshot(&self, info: &SnapshotInfo) -> Result<bool> {
        self.snapshots.validate(&info.path, &info.hash)
    }

    /// Row count of a snapshot, counted by streaming the file. Listing does
    /// not read snapshot bodies, so counts are computed on demand.
    pub fn snapshot_rows(&self, info: &SnapshotInfo) -> Result<usize> {
        self.snapshots.count_rows(&info.path)
    }

    /// Current catalog entries, cloned out of the lock.
    pub fn entries(&self) -> Vec<CatalogEntry> {
        lock_mutex(&self.catalog).entries().cloned().collect()
    }

    /// Catalog entries via the TTL read cache. Serves repeat readers without
    /// touching the catalog lock until the TTL lapses.
    pub fn cached_entries(&self) -> Vec<CatalogEntry> {
        let mut cache = lock_mutex(&self.read_cache);
        if let Some(ref cached) = *cache {
            if cached.is_valid() {
                return cached.entries().to_vec();
            }
        }
        let entries: Vec<CatalogEntry> =
            lock_mutex(&self.catalog).entries().cloned().collect();
        *cache = Some(CachedCatalog::new(entries.clone(), self.config.cache_ttl));
        entries
    }

    pub fn contains(&self, digest: &str) -> bool {
        lock_mutex(&self.catalog).contains(digest)
    }

    pub fn entry(&self, digest: &str) -> Option<CatalogEntry> {
        lock_mutex(&self.catalog).entry(digest).cloned()
    }

    /// Remove a photo from the catalog by digest and publish the change.
    pub fn remove(&self, digest: &str) -> Result<Option<CatalogEntry>> {
        let removed = lock_mutex(&self.catalog).remove(digest);
        if removed.is_some() {
            self.publish_snapshot()?;
        }
        Ok(removed)
    }

    /// Path of the cached thumbnail for a digest, if one has been generated.
    pub fn thumbnail_path(&self, digest: &str) -> Option<PathBuf> {
        let path = self.thumbnails.path_for(digest);
        path.exists().then_some(path)
    }

    pub fn metadata(&self, digest: &str) -> Option<PhotoMetadata> {
        lock_mutex(&self.metadata).get(digest)
    }

    pub fn stats(&self) -> Result<LibraryStats> {
        let (total_entries, pending_entries) = {
            let catalog = lock_mutex(&self.catalog);
            (catalog.len(), catalog.pending_count())
        };
        Ok(LibraryStats {
            total_entries,
            pending_entries,
            total_snapshots: self.snapshots.list()?.len(),
        })
    }

    /// Push this library's catalog and photo objects to a remote store under
    /// the given user namespace.
    pub fn sync(&self, store: &dyn ObjectStore, user_id: &str) -> Result<SyncReport> {
        let catalog = lock_mutex(&self.catalog).clone();
        let sources = lock_mutex(&self.local_paths).clone();
        let service = SyncService::new(store, user_id, self.config.hash_algorithm);
        service.push(&catalog, &sources, &self.thumbnails)
    }

    /// Download remote thumbnails absent from the local cache. Returns the
    /// count fetched.
    pub fn pull_thumbnails(&self, store: &dyn ObjectStore, user_id: &str) -> Result<usize> {
        let service = SyncService::new(store, user_id, self.config.hash_algorithm);
        service.pull_missing_thumbnails(&self.thumbnails)
    }

    /// Fetch the remote catalog for a user, if one has been published.
    pub fn fetch_remote(
        &self,
        store: &dyn ObjectStore,
        user_id: &str,
    ) -> Result<Option<(String, CatalogDatabase)>> {
        SyncService::new(store, user_id, self.config.hash_algorithm).fetch_remote_catalog()
    }

    /// Delete every remote object in a user's namespace: photos, thumbnails,
    /// snapshots, and the pointer. Returns the number of objects deleted.
    pub fn delete_remote(&self, store: &dyn ObjectStore, user_id: &str) -> Result<usize> {
        SyncService::new(store, user_id, self.config.hash_algorithm).delete_user_namespace()
    }
}

/// Clears the processing flag when a run ends, including on early return.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_root() {
        assert!(matches!(
            Library::open(Path::new("/definitely/not/a/real/path")),
            Err(Error::RootNotFound(_))
        ));
    }

    #[test]
    fn test_open_root_not_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            Library::open(&file),
            Err(Error::RootNotDirectory(_))
        ));
    }

    #[test]
    fn test_open_fresh_library_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let library = Library::open(tmp.path()).unwrap();
        assert!(library.entries().is_empty());
        assert!(tmp.path().join(METADATA_DIR).is_dir());
    }

    #[test]
    fn test_default_config() {
        let config = LibraryConfig::default();
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.workers, 4);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Md5);
    }
}
