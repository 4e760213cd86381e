use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use crate::domain::{PhotoFormat, PhotoItem};
use crate::error::Result;

/// A discovered file with the cheap metadata available before any hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub size: u64,
    pub mtime: i64,
}

impl ScannedFile {
    pub fn into_item(self) -> PhotoItem {
        PhotoItem::LocalFile { path: self.path }
    }
}

/// Recursively discover supported photo files under `root`.
/// Hidden entries are skipped, which also keeps the `.photolala` metadata
/// directory out of its own catalog.
pub fn scan_directory(root: &Path) -> Result<Vec<ScannedFile>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name().to_str()));

    for dirent in walker {
        let dirent = dirent?;
        if !dirent.file_type().is_file() {
            continue;
        }
        if PhotoFormat::from_extension(dirent.path()) == PhotoFormat::Unknown {
            continue;
        }

        let meta = dirent.metadata()?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        files.push(ScannedFile {
            path: dirent.path().to_path_buf(),
            size: meta.len(),
            mtime,
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn is_hidden(name: Option<&str>) -> bool {
    name.is_some_and(|n| n.starts_with('.'))
}
