//! Immutable, content-addressed catalog snapshots plus the mutable pointer.
//!
//! A snapshot is `catalog.<digest>.csv`, named by the digest of its own body,
//! written once and then made read-only. The pointer file names which snapshot
//! is authoritative; updating the catalog always means publish-then-repoint.

use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::catalog::csv;
use crate::error::{Error, Result};
use crate::hasher::{self, HashAlgorithm};

pub const POINTER_FILE: &str = "catalog.pointer";

/// Metadata describing one published snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub hash: String,
    pub path: PathBuf,
    /// Unix seconds of the snapshot file's creation.
    pub created_at: i64,
    pub byte_size: u64,
    /// Known when the body was in hand (publish, `read_current`); `None`
    /// from [`SnapshotStore::list`], which never reads snapshot bodies.
    pub row_count: Option<usize>,
}

/// Snapshot directory manager. Publication ordering is the crash-safety
/// contract: the snapshot body is fully written and fsynced before the
/// pointer is rewritten, and the pointer rewrite is an atomic rename.
pub struct SnapshotStore {
    dir: PathBuf,
    algorithm: HashAlgorithm,
}

impl SnapshotStore {
    /// Open (or create) the snapshot directory.
    pub fn open(dir: &Path, algorithm: HashAlgorithm) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            algorithm,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("catalog.{hash}.csv"))
    }

    fn pointer_path(&self) -> PathBuf {
        self.dir.join(POINTER_FILE)
    }

    /// Publish a CSV body as an immutable snapshot and repoint the pointer.
    ///
    /// If a snapshot with the same content hash already exists on disk the
    /// write is skipped (content addressing makes this a success, not a
    /// conflict) but the pointer is still updated.
    pub fn publish(&self, body: &[u8]) -> Result<SnapshotInfo> {
        let hash = hasher::digest_bytes(body, self.algorithm);
        let path = self.snapshot_path(&hash);

        if !path.exists() {
            let mut file = fs::File::create(&path)?;
            file.write_all(body)?;
            file.sync_all()?;
            drop(file);

            // Enforce immutability at the filesystem level.
            let mut perms = fs::metadata(&path)?.permissions();
            perms.set_readonly(true);
            fs::set_permissions(&path, perms)?;
        }

        self.write_pointer(&hash)?;

        let meta = fs::metadata(&path)?;
        Ok(SnapshotInfo {
            hash,
            path,
            created_at: file_created_at(&meta),
            byte_size: meta.len(),
            row_count: Some(csv::row_count(&String::from_utf8_lossy(body))),
        })
    }

    /// Atomically replace the pointer: write a temp file, fsync, rename.
    /// Readers see either the old hash or the new one, never a partial write.
    fn write_pointer(&self, hash: &str) -> Result<()> {
        let tmp = self.dir.join(format!("{POINTER_FILE}.tmp"));
        let mut file = fs::File::create(&tmp)?;
        writeln!(file, "{hash}")?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, self.pointer_path())?;
        Ok(())
    }

    /// Read the pointer and return the hash it names.
    ///
    /// A missing pointer file means "no catalog yet" (`PointerMissing`); an
    /// empty or non-hex pointer means corruption (`InvalidPointer`). Callers
    /// branch on the two to decide between initializing a fresh catalog and
    /// alerting.
    pub fn read_pointer(&self) -> Result<String> {
        let path = self.pointer_path();
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::PointerMissing(path));
            }
            Err(e) => return Err(e.into()),
        };
        let hash = content.trim();
        if !hasher::is_hex_digest(hash) {
            return Err(Error::InvalidPointer(hash.to_string()));
        }
        Ok(hash.to_string())
    }

    /// Resolve pointer → snapshot and return its metadata plus body.
    /// A pointer naming an absent snapshot file is `CatalogNotFound`.
    pub fn read_current(&self) -> Result<(SnapshotInfo, Vec<u8>)> {
        let hash = self.read_pointer()?;
        let path = self.snapshot_path(&hash);
        let body = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::CatalogNotFound(hash));
            }
            Err(e) => return Err(e.into()),
        };
        let meta = fs::metadata(&path)?;
        Ok((
            SnapshotInfo {
                hash,
                path,
                created_at: file_created_at(&meta),
                byte_size: meta.len(),
                row_count: Some(csv::row_count(&String::from_utf8_lossy(&body))),
            },
            body,
        ))
    }

    /// Enumerate all snapshots in the directory, newest first by file
    /// creation time. Listing only stats files; bodies are never read, so
    /// cost does not grow with total snapshot bytes. Row counts are
    /// available on demand via [`SnapshotStore::count_rows`].
    pub fn list(&self) -> Result<Vec<SnapshotInfo>> {
        let mut snapshots = Vec::new();
        for dirent in fs::read_dir(&self.dir)? {
            let dirent = dirent?;
            let name = dirent.file_name();
            let Some(hash) = parse_snapshot_name(&name.to_string_lossy()) else {
                continue;
            };
            let meta = dirent.metadata()?;
            let info = SnapshotInfo {
                hash,
                path: dirent.path(),
                created_at: file_created_at(&meta),
                byte_size: meta.len(),
                row_count: None,
            };
            snapshots.push((file_created_precise(&meta), info));
        }
        // Newest first, ordered by the full-resolution timestamp; tie-break
        // on hash for a stable order.
        snapshots.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.hash.cmp(&b.1.hash)));
        Ok(snapshots.into_iter().map(|(_, info)| info).collect())
    }

    /// Delete all but the newest `keep` snapshots. The snapshot currently
    /// referenced by the pointer is never deleted, even when it falls outside
    /// the newest `keep`. Returns the count actually deleted; individual
    /// delete failures are logged and skipped.
    pub fn prune(&self, keep: usize) -> Result<usize> {
        let snapshots = self.list()?;
        let current = self.read_pointer().ok();

        let mut deleted = 0;
        for info in snapshots.into_iter().skip(keep) {
            if current.as_deref() == Some(info.hash.as_str()) {
                continue;
            }
            // Snapshot files are read-only; restore the write bit first.
            if let Ok(meta) = fs::metadata(&info.path) {
                let mut perms = meta.permissions();
                #[allow(clippy::permissions_set_readonly_false)]
                perms.set_readonly(false);
                let _ = fs::set_permissions(&info.path, perms);
            }
            match fs::remove_file(&info.path) {
                Ok(()) => deleted += 1,
                Err(e) => warn!("failed to prune snapshot {}: {e}", info.path.display()),
            }
        }
        Ok(deleted)
    }

    /// Recompute a snapshot's content hash and compare. A mismatch is a
    /// data-integrity answer, not a control-flow error, so this returns
    /// `Ok(false)` rather than failing.
    pub fn validate(&self, path: &Path, expected_hash: &str) -> Result<bool> {
        let actual = hasher::compute_full_digest(path, self.algorithm)?;
        Ok(actual == expected_hash)
    }

    /// Count the catalog rows in a snapshot by streaming it line by line.
    /// Skips the header and blank lines, same as the CSV parser.
    pub fn count_rows(&self, path: &Path) -> Result<usize> {
        let file = fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let mut count = 0;
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if line.is_empty() || (idx == 0 && line == csv::CSV_HEADER) {
                continue;
            }
            count += 1;
        }
        Ok(count)
    }
}

/// Extract the hash from a `catalog.<hex>.csv` filename.
fn parse_snapshot_name(name: &str) -> Option<String> {
    let hash = name.strip_prefix("catalog.")?.strip_suffix(".csv")?;
    if hasher::is_hex_digest(hash) {
        Some(hash.to_string())
    } else {
        None
    }
}

fn file_created_precise(meta: &fs::Metadata) -> std::time::SystemTime {
    meta.created()
        .or_else(|_| meta.modified())
        .unwrap_or(UNIX_EPOCH)
}

fn file_created_at(meta: &fs::Metadata) -> i64 {
    meta.created()
        .or_else(|_| meta.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(tmp: &tempfile::TempDir) -> SnapshotStore {
        SnapshotStore::open(&tmp.path().join(".photolala"), HashAlgorithm::Md5).unwrap()
    }

    fn body(tag: &str) -> Vec<u8> {
        format!("aaa{tag},100,fff{tag},1700000000,JPEG\n").into_bytes()
    }

    #[test]
    fn test_publish_names_file_by_content_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);

        let body = body("1");
        let info = store.publish(&body).unwrap();

        assert_eq!(info.hash, hasher::digest_bytes(&body, HashAlgorithm::Md5));
        assert_eq!(info.hash.len(), 32);
        assert!(info.path.ends_with(format!("catalog.{}.csv", info.hash)));
        assert!(info.path.exists());
        assert_eq!(info.row_count, Some(1));
        assert_eq!(info.byte_size, body.len() as u64);
    }

    #[test]
    fn test_published_snapshot_is_read_only() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let info = store.publish(&body("1")).unwrap();

        let perms = fs::metadata(&info.path).unwrap().permissions();
        assert!(perms.readonly());
    }

    #[test]
    fn test_publish_updates_pointer() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let info = store.publish(&body("1")).unwrap();
        assert_eq!(store.read_pointer().unwrap(), info.hash);
    }

    #[test]
    fn test_publish_identical_body_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);

        let first = store.publish(&body("1")).unwrap();
        let second = store.publish(&body("1")).unwrap();
        assert_eq!(first.hash, second.hash);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_publish_existing_hash_still_repoints() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);

        let a = store.publish(&body("a")).unwrap();
        let b = store.publish(&body("b")).unwrap();
        assert_eq!(store.read_pointer().unwrap(), b.hash);

        // Republishing body "a" does not write a new file but repoints.
        let again = store.publish(&body("a")).unwrap();
        assert_eq!(again.hash, a.hash);
        assert_eq!(store.read_pointer().unwrap(), a.hash);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_different_bodies_different_hashes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let a = store.publish(&body("a")).unwrap();
        let b = store.publish(&body("b")).unwrap();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_missing_pointer_is_distinct_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        assert!(matches!(
            store.read_pointer().unwrap_err(),
            Error::PointerMissing(_)
        ));
        assert!(matches!(
            store.read_current().unwrap_err(),
            Error::PointerMissing(_)
        ));
    }

    #[test]
    fn test_empty_pointer_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        fs::write(store.dir().join(POINTER_FILE), "\n").unwrap();
        assert!(matches!(
            store.read_pointer().unwrap_err(),
            Error::InvalidPointer(_)
        ));
    }

    #[test]
    fn test_garbage_pointer_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        fs::write(store.dir().join(POINTER_FILE), "not-a-digest\n").unwrap();
        assert!(matches!(
            store.read_pointer().unwrap_err(),
            Error::InvalidPointer(_)
        ));
    }

    #[test]
    fn test_pointer_to_missing_snapshot_is_catalog_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        fs::write(
            store.dir().join(POINTER_FILE),
            "d41d8cd98f00b204e9800998ecf8427e\n",
        )
        .unwrap();
        assert!(matches!(
            store.read_current().unwrap_err(),
            Error::CatalogNotFound(_)
        ));
    }

    #[test]
    fn test_pointer_tolerates_surrounding_whitespace() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        fs::write(
            store.dir().join(POINTER_FILE),
            "  d41d8cd98f00b204e9800998ecf8427e  \n",
        )
        .unwrap();
        assert_eq!(
            store.read_pointer().unwrap(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn test_read_current_returns_body() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let published = store.publish(&body("x")).unwrap();

        let (info, bytes) = store.read_current().unwrap();
        assert_eq!(info.hash, published.hash);
        assert_eq!(bytes, body("x"));
    }

    #[test]
    fn test_list_ignores_foreign_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        store.publish(&body("1")).unwrap();
        fs::write(store.dir().join("notes.txt"), "x").unwrap();
        fs::write(store.dir().join("catalog.zzz.csv"), "x").unwrap();

        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_list_defers_row_counts() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        store.publish(&body("1")).unwrap();

        let infos = store.list().unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].row_count, None);
        assert_eq!(store.count_rows(&infos[0].path).unwrap(), 1);
    }

    #[test]
    fn test_count_rows_skips_header_and_blank_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let body = format!(
            "{}\naaa,100,fff,1700000000,JPEG\n\nbbb,200,,1700000001,PNG\n",
            csv::CSV_HEADER
        );
        let info = store.publish(body.as_bytes()).unwrap();

        assert_eq!(info.row_count, Some(2));
        assert_eq!(store.count_rows(&info.path).unwrap(), 2);
    }

    #[test]
    fn test_prune_keeps_newest_and_pointer_target() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);

        let first = store.publish(&body("1")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        store.publish(&body("2")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        store.publish(&body("3")).unwrap();

        // Repoint back to the oldest snapshot, then prune to 1.
        store.publish(&body("1")).unwrap();
        assert_eq!(store.read_pointer().unwrap(), first.hash);

        let deleted = store.prune(1).unwrap();
        assert_eq!(deleted, 1); // only "2" goes; "3" is newest, "1" is pointed-to

        let remaining: Vec<String> =
            store.list().unwrap().into_iter().map(|s| s.hash).collect();
        assert!(remaining.contains(&first.hash));
        assert_eq!(remaining.len(), 2);
    }

    #[test]
    fn test_prune_zero_keeps_pointer_target() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let info = store.publish(&body("only")).unwrap();

        let deleted = store.prune(0).unwrap();
        assert_eq!(deleted, 0);
        assert!(info.path.exists());
    }

    #[test]
    fn test_validate_matches_and_mismatches() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp);
        let info = store.publish(&body("v")).unwrap();

        assert!(store.validate(&info.path, &info.hash).unwrap());
        assert!(!store
            .validate(&info.path, "00000000000000000000000000000000")
            .unwrap());
    }

    #[test]
    fn test_snapshot_name_parsing() {
        assert_eq!(
            parse_snapshot_name("catalog.d41d8cd98f00b204e9800998ecf8427e.csv"),
            Some("d41d8cd98f00b204e9800998ecf8427e".to_string())
        );
        assert_eq!(parse_snapshot_name("catalog.pointer"), None);
        assert_eq!(parse_snapshot_name("catalog.nothex.csv"), None);
        assert_eq!(parse_snapshot_name("other.csv"), None);
    }
}
