//! Read caches owned by the `Library` instance. All three are explicitly
//! constructed and injected; none is a process-wide singleton.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::domain::{CatalogEntry, PhotoMetadata};
use crate::error::Result;

/// TTL for the decoded-catalog read cache. Keeps repeat reads off slow or
/// network volumes.
pub const CATALOG_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

pub const METADATA_CACHE_CAPACITY: usize = 4096;

/// Transient decoded photo list plus a load timestamp. Not authoritative;
/// always re-derivable from the current snapshot.
#[derive(Debug, Clone)]
pub struct CachedCatalog {
    entries: Vec<CatalogEntry>,
    loaded_at: Instant,
    ttl: Duration,
}

impl CachedCatalog {
    pub fn new(entries: Vec<CatalogEntry>, ttl: Duration) -> Self {
        Self {
            entries,
            loaded_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.loaded_at.elapsed() < self.ttl
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }
}

/// On-disk thumbnail cache keyed by full digest, which makes thumbnails
/// portable across renames and shared between local and remote views of the
/// same photo.
pub struct ThumbnailCache {
    dir: PathBuf,
}

impl ThumbnailCache {
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn path_for(&self, digest: &str) -> PathBuf {
        self.dir.join(format!("{digest}.jpg"))
    }

    pub fn contains(&self, digest: &str) -> bool {
        self.path_for(digest).exists()
    }

    /// Store thumbnail bytes for a digest. Content-addressed: if the file
    /// already exists the write is skipped.
    pub fn store(&self, digest: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(digest);
        if !path.exists() {
            fs::write(&path, bytes)?;
        }
        Ok(path)
    }

    pub fn get(&self, digest: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(digest)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn len(&self) -> Result<usize> {
        let mut count = 0;
        for dirent in fs::read_dir(&self.dir)? {
            let dirent = dirent?;
            if dirent.path().extension().is_some_and(|e| e == "jpg") {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Bounded in-memory metadata cache keyed by full digest, with TTL and
/// oldest-insertion eviction.
pub struct MetadataCache {
    map: HashMap<String, (PhotoMetadata, Instant)>,
    order: VecDeque<String>,
    capacity: usize,
    ttl: Duration,
}

impl MetadataCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            capacity,
            ttl,
        }
    }

    pub fn insert(&mut self, digest: String, metadata: PhotoMetadata) {
        if self.map.insert(digest.clone(), (metadata, Instant::now())).is_none() {
            self.order.push_back(digest);
        }
        while self.map.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.map.remove(&oldest);
        }
    }

    pub fn get(&mut self, digest: &str) -> Option<PhotoMetadata> {
        let (_, inserted_at) = self.map.get(digest)?;
        if inserted_at.elapsed() >= self.ttl {
            self.map.remove(digest);
            self.order.retain(|d| d != digest);
            return None;
        }
        self.map.get(digest).map(|(m, _)| m.clone())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
