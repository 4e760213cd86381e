pub mod csv;

use std::collections::HashMap;
use std::path::Path;

use crate::domain::{CatalogEntry, FastKey};
use crate::error::{Error, Result};

/// In-memory photo index. Entries are grouped in buckets per fast key, with a
/// secondary index by full digest: a fast key is only a pre-identity, so two
/// photos sharing a 64KB prefix and byte length occupy the same bucket as
/// distinct entries, told apart by their full digests. Mutations mark the
/// table dirty; persistence happens only when a snapshot is published, never
/// on individual upserts.
///
/// All mutation must flow through a single owner (the `Library` monitor);
/// this type itself is plain data.
#[derive(Debug, Default, Clone)]
pub struct CatalogDatabase {
    entries: HashMap<FastKey, Vec<CatalogEntry>>,
    by_digest: HashMap<String, FastKey>,
    dirty: bool,
}

impl CatalogDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update an entry. Idempotent: upserting the same content
    /// twice yields one entry. A completed entry (digest known) reconciles by
    /// digest within its bucket; a provisional entry (digest pending) claims
    /// the bucket's pending slot, of which there is at most one.
    pub fn upsert(&mut self, entry: CatalogEntry) {
        let fast_key = entry.fast_key.clone();
        let bucket = self.entries.entry(fast_key.clone()).or_default();

        match entry.full_digest.clone() {
            Some(digest) => {
                if let Some(pos) = bucket
                    .iter()
                    .position(|e| e.full_digest.as_deref() == Some(digest.as_str()))
                {
                    if bucket[pos] != entry {
                        bucket[pos] = entry;
                        self.dirty = true;
                    }
                    // A provisional left over from a rescan of this content
                    // is redundant once the completed entry is in place.
                    if let Some(pending) = bucket.iter().position(|e| e.full_digest.is_none()) {
                        bucket.remove(pending);
                        self.dirty = true;
                    }
                } else if let Some(pos) = bucket.iter().position(|e| e.full_digest.is_none()) {
                    bucket[pos] = entry;
                    self.by_digest.insert(digest, fast_key);
                    self.dirty = true;
                } else {
                    bucket.push(entry);
                    self.by_digest.insert(digest, fast_key);
                    self.dirty = true;
                }
            }
            None => match bucket.iter().position(|e| e.full_digest.is_none()) {
                Some(pos) => {
                    if bucket[pos] != entry {
                        bucket[pos] = entry;
                        self.dirty = true;
                    }
                }
                None => {
                    bucket.push(entry);
                    self.dirty = true;
                }
            },
        }
    }

    /// Transition an entry from fast-key-only to fully identified.
    ///
    /// If the digest is already present in the bucket this is a rescan of
    /// known content: the redundant provisional is dropped. If another file
    /// has already claimed the bucket's pending slot (a fast-key collision
    /// resolved in parallel), a distinct entry is derived for the new digest
    /// so both photos are retained.
    pub fn update_full_digest(&mut self, fast_key: &FastKey, full_digest: &str) -> Result<()> {
        let bucket = self
            .entries
            .get_mut(fast_key)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| Error::EntryNotFound(fast_key.head_digest.clone()))?;

        if bucket
            .iter()
            .any(|e| e.full_digest.as_deref() == Some(full_digest))
        {
            if let Some(pending) = bucket.iter().position(|e| e.full_digest.is_none()) {
                bucket.remove(pending);
                self.dirty = true;
            }
            return Ok(());
        }

        if let Some(pos) = bucket.iter().position(|e| e.full_digest.is_none()) {
            bucket[pos].full_digest = Some(full_digest.to_string());
        } else {
            let Some(mut derived) = bucket.first().cloned() else {
                return Err(Error::EntryNotFound(fast_key.head_digest.clone()));
            };
            derived.full_digest = Some(full_digest.to_string());
            bucket.push(derived);
        }
        self.by_digest
            .insert(full_digest.to_string(), fast_key.clone());
        self.dirty = true;
        Ok(())
    }

    /// Replace the provisional filesystem date once an EXIF capture date is
    /// known. Keyed by full digest: within a bucket only the digest
    /// identifies one photo.
    pub fn update_capture_date(&mut self, full_digest: &str, date: i64) -> Result<()> {
        let fast_key = self
            .by_digest
            .get(full_digest)
            .cloned()
            .ok_or_else(|| Error::EntryNotFound(full_digest.to_string()))?;
        let entry = self
            .entries
            .get_mut(&fast_key)
            .and_then(|bucket| {
                bucket
                    .iter_mut()
                    .find(|e| e.full_digest.as_deref() == Some(full_digest))
            })
            .ok_or_else(|| Error::EntryNotFound(full_digest.to_string()))?;
        if entry.capture_or_file_date != date {
            entry.capture_or_file_date = date;
            self.dirty = true;
        }
        Ok(())
    }

    /// O(1) lookup by full digest.
    pub fn contains(&self, full_digest: &str) -> bool {
        self.by_digest.contains_key(full_digest)
    }

    pub fn entry(&self, full_digest: &str) -> Option<&CatalogEntry> {
        let fast_key = self.by_digest.get(full_digest)?;
        self.entries
            .get(fast_key)?
            .iter()
            .find(|e| e.full_digest.as_deref() == Some(full_digest))
    }

    /// All entries sharing a fast key. Usually one; more after a fast-key
    /// collision between different content.
    pub fn entries_for_fast_key(&self, fast_key: &FastKey) -> &[CatalogEntry] {
        self.entries
            .get(fast_key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Remove the entry identified by a full digest. Returns the removed
    /// entry, or `None` if the digest was unknown.
    pub fn remove(&mut self, full_digest: &str) -> Option<CatalogEntry> {
        let fast_key = self.by_digest.remove(full_digest)?;
        let bucket = self.entries.get_mut(&fast_key)?;
        let pos = bucket
            .iter()
            .position(|e| e.full_digest.as_deref() == Some(full_digest))?;
        let entry = bucket.remove(pos);
        if bucket.is_empty() {
            self.entries.remove(&fast_key);
        }
        self.dirty = true;
        Some(entry)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values().flatten()
    }

    /// All fully identified digests.
    pub fn digests(&self) -> impl Iterator<Item = &str> {
        self.by_digest.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries still awaiting their full digest.
    pub fn pending_count(&self) -> usize {
        self.entries
            .values()
            .flatten()
            .filter(|e| e.full_digest.is_none())
            .count()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Serialize the full table with the fixed, versioned column set.
    pub fn export_csv(&self) -> String {
        let rows: Vec<CatalogEntry> = self.entries.values().flatten().cloned().collect();
        csv::export(&rows)
    }

    /// Build a catalog from a CSV body. The loaded table starts clean.
    pub fn from_csv(body: &str) -> Result<Self> {
        let mut db = Self::new();
        for entry in csv::parse(body)? {
            db.upsert(entry);
        }
        db.dirty = false;
        Ok(db)
    }

    pub fn load_csv(path: &Path) -> Result<Self> {
        let body = std::fs::read_to_string(path)?;
        Self::from_csv(&body)
    }

    /// Merge `self` over `remote` with a deliberately simple last-action-wins
    /// policy: the union of both tables, where entries from `self` replace
    /// remote entries with the same digest. No three-way merge is attempted.
    pub fn merged_over(&self, remote: &CatalogDatabase) -> CatalogDatabase {
        let mut merged = remote.clone();
        for entry in self.entries() {
            merged.upsert(entry.clone());
        }
        merged
    }
}
