//! Cloud synchronization against an S3-style object store.
//!
//! The remote layout mirrors the local one: content-addressed photo and
//! thumbnail objects, immutable catalog snapshots, and a single mutable
//! pointer per user. Upload ordering is the consistency contract: objects
//! first, then the merged snapshot, and the pointer last, so a reader
//! following the pointer always finds every object the catalog references.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, info, warn};

use crate::cache::ThumbnailCache;
use crate::catalog::CatalogDatabase;
use crate::error::{Error, Result};
use crate::hasher::{self, HashAlgorithm};

/// Minimal object-store surface the sync engine needs. Implemented by the
/// in-memory store for tests and by [`FsObjectStore`] for local remotes;
/// an S3 client slots in behind the same trait.
pub trait ObjectStore: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()>;
    fn exists(&self, key: &str) -> Result<bool>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Delete one object. Deleting an absent key is a no-op success.
    fn delete(&self, key: &str) -> Result<()>;
    /// Keys under a prefix, in sorted order.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Remote key layout, namespaced per user.
#[derive(Debug, Clone)]
pub struct RemoteKeys {
    user_id: String,
}

impl RemoteKeys {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    pub fn photo(&self, digest: &str) -> String {
        format!("photos/{}/{digest}", self.user_id)
    }

    pub fn thumbnail(&self, digest: &str) -> String {
        format!("thumbnails/{}/{digest}", self.user_id)
    }

    pub fn snapshot(&self, hash: &str) -> String {
        format!("catalogs/{}/catalog.{hash}.csv", self.user_id)
    }

    pub fn pointer(&self) -> String {
        format!("catalogs/{}/pointer", self.user_id)
    }

    /// Every prefix that makes up this user's remote namespace.
    pub fn namespace_prefixes(&self) -> [String; 3] {
        [
            format!("photos/{}/", self.user_id),
            format!("thumbnails/{}/", self.user_id),
            format!("catalogs/{}/", self.user_id),
        ]
    }
}

/// Per-photo outcome of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// Uploaded in this run.
    Completed,
    /// Already present remotely; nothing transferred.
    Skipped,
    /// Upload failed; the photo stays out of the published remote catalog.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncItemResult {
    pub digest: String,
    pub status: SyncStatus,
}

/// Outcome of a full push: per-item results plus the snapshot that was
/// published at the end.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub items: Vec<SyncItemResult>,
    pub snapshot_hash: Option<String>,
}

impl SyncReport {
    pub fn uploaded(&self) -> usize {
        self.count(|s| matches!(s, SyncStatus::Completed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, SyncStatus::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, SyncStatus::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&SyncStatus) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.status)).count()
    }
}

/// Push/pull engine over one user's remote namespace.
pub struct SyncService<'a> {
    store: &'a dyn ObjectStore,
    keys: RemoteKeys,
    algorithm: HashAlgorithm,
}

impl<'a> SyncService<'a> {
    pub fn new(store: &'a dyn ObjectStore, user_id: &str, algorithm: HashAlgorithm) -> Self {
        Self {
            store,
            keys: RemoteKeys::new(user_id),
            algorithm,
        }
    }

    /// Fetch and verify the remote catalog. `None` means the user has never
    /// synced. A pointer naming an absent snapshot is `CatalogNotFound`; a
    /// snapshot whose content does not hash to its name is
    /// `SnapshotMismatch`.
    pub fn fetch_remote_catalog(&self) -> Result<Option<(String, CatalogDatabase)>> {
        let Some(pointer) = self.store.get(&self.keys.pointer())? else {
            return Ok(None);
        };
        let hash = String::from_utf8_lossy(&pointer).trim().to_string();
        if !hasher::is_hex_digest(&hash) {
            return Err(Error::InvalidPointer(hash));
        }

        let Some(body) = self.store.get(&self.keys.snapshot(&hash))? else {
            return Err(Error::CatalogNotFound(hash));
        };
        let actual = hasher::digest_bytes(&body, self.algorithm);
        if actual != hash {
            return Err(Error::SnapshotMismatch {
                expected: hash,
                actual,
            });
        }

        let catalog = CatalogDatabase::from_csv(&String::from_utf8_lossy(&body))?;
        Ok(Some((hash, catalog)))
    }

    /// Push local photos absent from the remote catalog, then publish the
    /// merged catalog and repoint.
    ///
    /// Failures are isolated per photo: a failed upload excludes that entry
    /// from the published remote catalog but never aborts the run, so the
    /// pointer update at the end always references a snapshot whose every
    /// entry has its object uploaded.
    pub fn push(
        &self,
        local: &CatalogDatabase,
        sources: &HashMap<String, PathBuf>,
        thumbnails: &ThumbnailCache,
    ) -> Result<SyncReport> {
        let remote = self
            .fetch_remote_catalog()?
            .map(|(_, catalog)| catalog)
            .unwrap_or_default();

        let mut report = SyncReport::default();
        let mut failed_digests = Vec::new();

        let mut candidates: Vec<&str> = local
            .digests()
            .filter(|d| !remote.contains(d))
            .collect();
        candidates.sort_unstable();
        info!(
            "sync push: {} local entries, {} to transfer",
            local.len(),
            candidates.len()
        );

        for digest in candidates {
            let status = match self.push_photo(local, sources, thumbnails, digest) {
                Ok(status) => status,
                Err(e) => SyncStatus::Failed(e.to_string()),
            };
            if let SyncStatus::Failed(ref reason) = status {
                debug!("sync push failed for {digest}: {reason}");
                failed_digests.push(digest.to_string());
            }
            report.items.push(SyncItemResult {
                digest: digest.to_string(),
                status,
            });
        }

        // Publish last: merged catalog snapshot, then the pointer. Entries
        // whose uploads failed are withheld so the remote catalog never
        // references a missing object.
        let mut merged = local.merged_over(&remote);
        for digest in &failed_digests {
            merged.remove(digest);
        }

        let body = merged.export_csv().into_bytes();
        let hash = hasher::digest_bytes(&body, self.algorithm);
        let snapshot_key = self.keys.snapshot(&hash);
        if !self.store.exists(&snapshot_key)? {
            self.store.put(&snapshot_key, &body, "text/csv")?;
        }
        self.store
            .put(&self.keys.pointer(), hash.as_bytes(), "text/plain")?;

        info!(
            "sync push complete: {} uploaded, {} skipped, {} failed, snapshot {hash}",
            report.uploaded(),
            report.skipped(),
            report.failed()
        );
        report.snapshot_hash = Some(hash);
        Ok(report)
    }

    fn push_photo(
        &self,
        local: &CatalogDatabase,
        sources: &HashMap<String, PathBuf>,
        thumbnails: &ThumbnailCache,
        digest: &str,
    ) -> Result<SyncStatus> {
        let entry = local
            .entry(digest)
            .ok_or_else(|| Error::EntryNotFound(digest.to_string()))?;

        let photo_key = self.keys.photo(digest);
        let status = if self.store.exists(&photo_key)? {
            SyncStatus::Skipped
        } else {
            let Some(path) = sources.get(digest) else {
                return Ok(SyncStatus::Failed(format!(
                    "no local source file for {digest}"
                )));
            };
            let bytes = std::fs::read(path)?;
            self.store
                .put(&photo_key, &bytes, entry.format.content_type())?;
            SyncStatus::Completed
        };

        // Thumbnail is best-effort alongside the photo; its absence locally
        // is not a failure.
        if let Some(thumb) = thumbnails.get(digest)? {
            let thumb_key = self.keys.thumbnail(digest);
            if !self.store.exists(&thumb_key)? {
                self.store.put(&thumb_key, &thumb, "image/jpeg")?;
            }
        }

        Ok(status)
    }

    pub fn pull_photo(&self, digest: &str) -> Result<Option<Vec<u8>>> {
        self.store.get(&self.keys.photo(digest))
    }

    pub fn pull_thumbnail(&self, digest: &str) -> Result<Option<Vec<u8>>> {
        self.store.get(&self.keys.thumbnail(digest))
    }

    /// Download thumbnails for remote catalog entries not yet cached locally.
    /// Returns the number fetched; digests without a remote thumbnail are
    /// left for the pipeline to regenerate from the photo bytes.
    pub fn pull_missing_thumbnails(&self, thumbnails: &ThumbnailCache) -> Result<usize> {
        let Some((_, remote)) = self.fetch_remote_catalog()? else {
            return Ok(0);
        };

        let mut fetched = 0;
        for digest in remote.digests() {
            if thumbnails.contains(digest) {
                continue;
            }
            if let Some(bytes) = self.pull_thumbnail(digest)? {
                thumbnails.store(digest, &bytes)?;
                fetched += 1;
            }
        }
        debug!("pulled {fetched} remote thumbnails");
        Ok(fetched)
    }

    /// Delete every object in this user's remote namespace: photos,
    /// thumbnails, catalog snapshots, and the pointer. The account-removal
    /// path.
    ///
    /// Failures are isolated per object: a key that cannot be deleted is
    /// logged and skipped, the rest of the namespace still goes. Returns the
    /// number of objects actually deleted.
    pub fn delete_user_namespace(&self) -> Result<usize> {
        let mut deleted = 0;
        for prefix in self.keys.namespace_prefixes() {
            let keys = self.store.list(&prefix)?;
            debug!("deleting {} remote objects under {prefix}", keys.len());
            for key in keys {
                match self.store.delete(&key) {
                    Ok(()) => deleted += 1,
                    Err(e) => warn!("failed to delete remote object {key}: {e}"),
                }
            }
        }
        info!("remote namespace deletion removed {deleted} objects");
        Ok(deleted)
    }
}

/// In-memory object store recording every call, for exercising the sync
/// engine without any I/O.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    log: Mutex<Vec<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_log(&self) -> Vec<String> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map(|(bytes, _)| bytes.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map(|(_, ct)| ct.clone())
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn record(&self, call: String) {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        self.record(format!("put {key}"));
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), (bytes.to_vec(), content_type.to_string()));
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        self.record(format!("exists {key}"));
        Ok(self
            .objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key))
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.record(format!("get {key}"));
        Ok(self
            .objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map(|(bytes, _)| bytes.clone()))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.record(format!("delete {key}"));
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.record(format!("list {prefix}"));
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }
}

/// Object store backed by a local directory, mapping keys to nested paths.
/// Useful as a "remote" on an external drive or network mount.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)
            .map_err(|e| Error::Remote(format!("{}: {e}", root.display())))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Remote(format!("{key}: {e}")))?;
        }
        std::fs::write(&path, bytes).map_err(|e| Error::Remote(format!("{key}: {e}")))
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key).exists())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Remote(format!("{key}: {e}"))),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Remote(format!("{key}: {e}"))),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.root.join(prefix);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for dirent in walkdir::WalkDir::new(&dir) {
            let dirent = dirent.map_err(|e| Error::Remote(e.to_string()))?;
            if !dirent.file_type().is_file() {
                continue;
            }
            if let Ok(rel) = dirent.path().strip_prefix(&self.root) {
                keys.push(rel.to_string_lossy().into_owned());
            }
        }
        keys.sort_unstable();
        Ok(keys)
    }
}
