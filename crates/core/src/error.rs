use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("EXIF parsing error: {0}")]
    Exif(#[from] exif::Error),

    #[error("walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("library root does not exist: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("library root is not a directory: {}", .0.display())]
    RootNotDirectory(PathBuf),

    #[error("unsupported file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("not a valid image: {}", .0.display())]
    InvalidImage(PathBuf),

    #[error("catalog pointer not found: {}", .0.display())]
    PointerMissing(PathBuf),

    #[error("catalog pointer is empty or malformed: {0:?}")]
    InvalidPointer(String),

    #[error("catalog snapshot not found for hash {0}")]
    CatalogNotFound(String),

    #[error("snapshot content hash mismatch: expected {expected}, got {actual}")]
    SnapshotMismatch { expected: String, actual: String },

    #[error("malformed catalog CSV at line {line}: {message}")]
    CsvParse { line: usize, message: String },

    #[error("catalog entry not found for fast key {0}")]
    EntryNotFound(String),

    #[error("a processing run is already in flight")]
    AlreadyProcessing,

    #[error("worker pool error: {0}")]
    WorkerPool(String),

    #[error("thumbnail generation failed: {0}")]
    Thumbnail(String),

    #[error("remote store error: {0}")]
    Remote(String),
}

pub type Result<T> = std::result::Result<T, Error>;
