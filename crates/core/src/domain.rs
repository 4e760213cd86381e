use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Supported photo formats. `Unknown` is kept so legacy catalog rows without a
/// format column still round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhotoFormat {
    Jpeg,
    Png,
    Heif,
    Raw,
    Unknown,
}

impl PhotoFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoFormat::Jpeg => "JPEG",
            PhotoFormat::Png => "PNG",
            PhotoFormat::Heif => "HEIF",
            PhotoFormat::Raw => "RAW",
            PhotoFormat::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "JPEG" => PhotoFormat::Jpeg,
            "PNG" => PhotoFormat::Png,
            "HEIF" => PhotoFormat::Heif,
            "RAW" => PhotoFormat::Raw,
            _ => PhotoFormat::Unknown,
        }
    }

    /// Classify a file by its extension. Unrecognized extensions map to `Unknown`.
    pub fn from_extension(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" => PhotoFormat::Jpeg,
            "png" => PhotoFormat::Png,
            "heic" | "heif" => PhotoFormat::Heif,
            "dng" | "cr2" | "cr3" | "nef" | "arw" | "orf" | "raf" | "rw2" => PhotoFormat::Raw,
            _ => PhotoFormat::Unknown,
        }
    }

    /// MIME type used as the format tag on remote photo objects.
    pub fn content_type(&self) -> &'static str {
        match self {
            PhotoFormat::Jpeg => "image/jpeg",
            PhotoFormat::Png => "image/png",
            PhotoFormat::Heif => "image/heif",
            PhotoFormat::Raw => "image/x-raw",
            PhotoFormat::Unknown => "application/octet-stream",
        }
    }

    /// Whether the `image` crate can decode this format (thumbnail + dimension
    /// extraction). HEIF and RAW are cataloged but not decoded.
    pub fn is_decodable(&self) -> bool {
        matches!(self, PhotoFormat::Jpeg | PhotoFormat::Png)
    }
}

impl fmt::Display for PhotoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cheap pre-identity for a photo: digest of the first 64KB prefix plus the
/// total byte length. Two files with different fast keys are definitely
/// different; equal fast keys still require a full digest to confirm identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FastKey {
    pub head_digest: String,
    pub file_size: u64,
}

/// One row of the catalog. `full_digest` is `None` between discovery and the
/// full-file hash; readers must tolerate the pending state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub fast_key: FastKey,
    pub full_digest: Option<String>,
    /// EXIF capture date when known, otherwise the filesystem date.
    /// Unix seconds, UTC.
    pub capture_or_file_date: i64,
    pub format: PhotoFormat,
}

impl CatalogEntry {
    pub fn new(fast_key: FastKey, date: i64, format: PhotoFormat) -> Self {
        Self {
            fast_key,
            full_digest: None,
            capture_or_file_date: date,
            format,
        }
    }
}

/// Metadata extracted during the pipeline's extraction stage. Not persisted in
/// the catalog CSV; served from the metadata cache keyed by full digest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotoMetadata {
    pub capture_date: Option<i64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub gps_lat: Option<f64>,
    pub gps_lon: Option<f64>,
    pub exposure_time: Option<String>,
    pub f_number: Option<f64>,
    pub iso: Option<u32>,
}

/// A photo the pipeline can ingest. The variant set is closed and matched
/// exhaustively: a file on disk, or a remote object already fetched by digest.
#[derive(Debug, Clone, PartialEq)]
pub enum PhotoItem {
    LocalFile {
        path: PathBuf,
    },
    RemoteObject {
        digest: String,
        format: PhotoFormat,
        bytes: Vec<u8>,
    },
}

impl PhotoItem {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        PhotoItem::LocalFile { path: path.into() }
    }

    /// Human-readable identifier used in progress and failure reports.
    pub fn display_name(&self) -> String {
        match self {
            PhotoItem::LocalFile { path } => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            PhotoItem::RemoteObject { digest, .. } => {
                format!("remote:{}", &digest[..digest.len().min(12)])
            }
        }
    }

    pub fn format(&self) -> PhotoFormat {
        match self {
            PhotoItem::LocalFile { path } => PhotoFormat::from_extension(path),
            PhotoItem::RemoteObject { format, .. } => *format,
        }
    }
}

/// Summary counts for the status surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryStats {
    pub total_entries: usize,
    pub pending_entries: usize,
    pub total_snapshots: usize,
}
