//! Per-file processing pipeline: validate → compute digest → extract
//! metadata → generate thumbnail → catalog.
//!
//! Files run in parallel inside a batch on a bounded worker pool; batches run
//! sequentially to bound peak memory and file-handle usage. A failure is
//! local to its file and never aborts the batch.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use rayon::prelude::*;

use crate::cache::{MetadataCache, ThumbnailCache};
use crate::catalog::CatalogDatabase;
use crate::domain::{CatalogEntry, FastKey, PhotoFormat, PhotoItem, PhotoMetadata};
use crate::error::{Error, Result};
use crate::hasher::{self, HashAlgorithm, FAST_KEY_PREFIX_LEN};
use crate::lock_mutex;
use crate::{exif, thumbnail};

/// Progress callback events for a pipeline run. Reported per batch, not per
/// file, to limit update overhead on large libraries.
pub enum ProcessProgress {
    /// Run accepted; total item count known.
    Started { total: usize },
    /// A batch finished. `processed` is monotonically non-decreasing.
    BatchComplete { processed: usize, total: usize },
    /// Run finished (or was cancelled at a batch boundary).
    Complete { cataloged: usize, failed: usize },
}

/// One file that failed, with enough detail to retry individually.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub name: String,
    pub reason: String,
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct ProcessReport {
    pub cataloged: usize,
    pub failures: Vec<FileFailure>,
    pub cancelled: bool,
}

/// Cooperative cancellation flag, checked at batch boundaries. In-flight
/// files in the current batch complete before cancellation takes effect.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Borrowed view of the library state a pipeline run mutates. All catalog
/// mutations go through the one `Mutex` the `Library` owns.
pub(crate) struct Pipeline<'a> {
    pub catalog: &'a Mutex<CatalogDatabase>,
    pub thumbnails: &'a ThumbnailCache,
    pub metadata: &'a Mutex<MetadataCache>,
    pub local_paths: &'a Mutex<HashMap<String, PathBuf>>,
    pub algorithm: HashAlgorithm,
    pub batch_size: usize,
    pub workers: usize,
}

impl Pipeline<'_> {
    pub fn run(
        &self,
        items: &[PhotoItem],
        mut progress: Option<&mut dyn FnMut(ProcessProgress)>,
        cancel: Option<&CancelToken>,
    ) -> Result<ProcessReport> {
        let total = items.len();
        if let Some(ref mut cb) = progress {
            cb(ProcessProgress::Started { total });
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers.max(1))
            .build()
            .map_err(|e| Error::WorkerPool(e.to_string()))?;

        let mut report = ProcessReport::default();
        let mut processed = 0usize;

        for batch in items.chunks(self.batch_size.max(1)) {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                report.cancelled = true;
                break;
            }

            let results: Vec<(String, Result<()>)> = pool.install(|| {
                batch
                    .par_iter()
                    .map(|item| (item.display_name(), self.process_one(item)))
                    .collect()
            });

            for (name, result) in results {
                match result {
                    Ok(()) => report.cataloged += 1,
                    Err(e) => report.failures.push(FileFailure {
                        name,
                        reason: e.to_string(),
                    }),
                }
            }

            processed += batch.len();
            if let Some(ref mut cb) = progress {
                cb(ProcessProgress::BatchComplete { processed, total });
            }
        }

        if let Some(ref mut cb) = progress {
            cb(ProcessProgress::Complete {
                cataloged: report.cataloged,
                failed: report.failures.len(),
            });
        }
        Ok(report)
    }

    fn process_one(&self, item: &PhotoItem) -> Result<()> {
        match item {
            PhotoItem::LocalFile { path } => self.process_local(path),
            PhotoItem::RemoteObject {
                digest,
                format,
                bytes,
            } => self.process_remote(digest, *format, bytes),
        }
    }

    fn process_local(&self, path: &Path) -> Result<()> {
        // Validate: supported format and plausible image content.
        let format = PhotoFormat::from_extension(path);
        if format == PhotoFormat::Unknown {
            return Err(Error::UnsupportedFormat(path.to_path_buf()));
        }

        let file = std::fs::File::open(path)?;
        let meta = file.metadata()?;
        let file_size = meta.len();
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let mut head = Vec::with_capacity(FAST_KEY_PREFIX_LEN.min(file_size as usize));
        file.take(FAST_KEY_PREFIX_LEN as u64).read_to_end(&mut head)?;

        if !matches_signature(format, &head) {
            return Err(Error::InvalidImage(path.to_path_buf()));
        }

        let fast_key = FastKey {
            head_digest: hasher::digest_bytes(&head, self.algorithm),
            file_size,
        };

        // Provisional entry first: partial progress is visible before the
        // expensive full-file hash runs.
        lock_mutex(self.catalog).upsert(CatalogEntry::new(fast_key.clone(), mtime, format));

        let full_digest = hasher::compute_full_digest(path, self.algorithm)?;
        lock_mutex(self.catalog).update_full_digest(&fast_key, &full_digest)?;
        lock_mutex(self.local_paths).insert(full_digest.clone(), path.to_path_buf());

        let bytes = std::fs::read(path)?;
        self.extract_and_thumbnail(&full_digest, format, &bytes)
    }

    fn process_remote(&self, digest: &str, format: PhotoFormat, bytes: &[u8]) -> Result<()> {
        let name = PathBuf::from(format!("remote:{digest}"));
        if format == PhotoFormat::Unknown {
            return Err(Error::UnsupportedFormat(name));
        }
        if !matches_signature(format, bytes) {
            return Err(Error::InvalidImage(name));
        }

        let fast_key = hasher::fast_key_from_bytes(bytes, self.algorithm);
        let date = exif::extract_metadata(bytes)
            .and_then(|m| m.capture_date)
            .unwrap_or_else(|| chrono::Utc::now().timestamp());

        let mut entry = CatalogEntry::new(fast_key, date, format);
        entry.full_digest = Some(digest.to_string());
        lock_mutex(self.catalog).upsert(entry);

        self.extract_and_thumbnail(digest, format, bytes)
    }

    /// Shared tail of the pipeline: metadata extraction then thumbnail
    /// generation, both keyed by the full digest.
    fn extract_and_thumbnail(
        &self,
        full_digest: &str,
        format: PhotoFormat,
        bytes: &[u8],
    ) -> Result<()> {
        let mut metadata = exif::extract_metadata(bytes).unwrap_or_default();

        // An embedded capture date overrides the provisional filesystem date.
        // Keyed by digest: fast-key-colliding siblings share a bucket.
        if let Some(capture_date) = metadata.capture_date {
            lock_mutex(self.catalog).update_capture_date(full_digest, capture_date)?;
        }

        if format.is_decodable() {
            let thumb = thumbnail::generate(bytes)?;
            if metadata.width.is_none() {
                metadata.width = Some(thumb.source_width);
                metadata.height = Some(thumb.source_height);
            }
            self.thumbnails.store(full_digest, &thumb.bytes)?;
        }

        if metadata != PhotoMetadata::default() {
            lock_mutex(self.metadata).insert(full_digest.to_string(), metadata);
        }
        Ok(())
    }
}

/// Cheap magic-byte check for the formats we catalog. RAW is accepted on the
/// TIFF container magic shared by DNG/CR2/NEF/ARW.
fn matches_signature(format: PhotoFormat, head: &[u8]) -> bool {
    match format {
        PhotoFormat::Jpeg => head.starts_with(&[0xFF, 0xD8, 0xFF]),
        PhotoFormat::Png => head.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
        PhotoFormat::Heif => head.len() >= 12 && &head[4..8] == b"ftyp",
        PhotoFormat::Raw => head.starts_with(b"II") || head.starts_with(b"MM"),
        PhotoFormat::Unknown => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageEncoder;
    use std::fs;
    use std::time::Duration;

    fn write_jpeg(path: &Path, seed: u8) {
        let img = image::RgbImage::from_fn(32, 32, |x, y| {
            image::Rgb([seed.wrapping_add(x as u8), y as u8, seed])
        });
        img.save(path).unwrap();
    }

    struct Fixture {
        catalog: Mutex<CatalogDatabase>,
        thumbnails: ThumbnailCache,
        metadata: Mutex<MetadataCache>,
        local_paths: Mutex<HashMap<String, PathBuf>>,
    }

    impl Fixture {
        fn new(tmp: &tempfile::TempDir) -> Self {
            Self {
                catalog: Mutex::new(CatalogDatabase::new()),
                thumbnails: ThumbnailCache::open(&tmp.path().join("thumbs")).unwrap(),
                metadata: Mutex::new(MetadataCache::new(64, Duration::from_secs(60))),
                local_paths: Mutex::new(HashMap::new()),
            }
        }

        fn pipeline(&self) -> Pipeline<'_> {
            Pipeline {
                catalog: &self.catalog,
                thumbnails: &self.thumbnails,
                metadata: &self.metadata,
                local_paths: &self.local_paths,
                algorithm: HashAlgorithm::Md5,
                batch_size: 4,
                workers: 2,
            }
        }
    }

    #[test]
    fn test_process_valid_jpegs() {
        let tmp = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(&tmp);

        let mut items = Vec::new();
        for i in 0..3u8 {
            let path = tmp.path().join(format!("photo_{i}.jpg"));
            write_jpeg(&path, i * 40);
            items.push(PhotoItem::local(path));
        }

        let report = fixture.pipeline().run(&items, None, None).unwrap();
        assert_eq!(report.cataloged, 3);
        assert!(report.failures.is_empty());
        assert!(!report.cancelled);

        let catalog = fixture.catalog.lock().unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.pending_count(), 0);
        for digest in catalog.digests() {
            assert!(fixture.thumbnails.contains(digest));
        }
    }

    #[test]
    fn test_corrupt_files_fail_without_aborting_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(&tmp);

        let mut items = Vec::new();
        for i in 0..8u8 {
            let path = tmp.path().join(format!("good_{i}.jpg"));
            write_jpeg(&path, i * 25);
            items.push(PhotoItem::local(path));
        }
        for name in ["bad_1.jpg", "bad_2.jpg"] {
            let path = tmp.path().join(name);
            fs::write(&path, b"this is not a jpeg").unwrap();
            items.push(PhotoItem::local(path));
        }

        let report = fixture.pipeline().run(&items, None, None).unwrap();
        assert_eq!(report.cataloged, 8);
        assert_eq!(report.failures.len(), 2);

        let failed_names: Vec<&str> =
            report.failures.iter().map(|f| f.name.as_str()).collect();
        assert!(failed_names.contains(&"bad_1.jpg"));
        assert!(failed_names.contains(&"bad_2.jpg"));

        assert_eq!(fixture.catalog.lock().unwrap().len(), 8);
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(&tmp);
        let path = tmp.path().join("notes.txt");
        fs::write(&path, b"text").unwrap();

        let report = fixture
            .pipeline()
            .run(&[PhotoItem::local(path)], None, None)
            .unwrap();
        assert_eq!(report.cataloged, 0);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].reason.contains("unsupported"));
    }

    #[test]
    fn test_duplicate_content_yields_one_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(&tmp);

        let original = tmp.path().join("original.jpg");
        write_jpeg(&original, 7);
        let copy = tmp.path().join("copy.jpg");
        fs::copy(&original, &copy).unwrap();

        let report = fixture
            .pipeline()
            .run(
                &[PhotoItem::local(original), PhotoItem::local(copy)],
                None,
                None,
            )
            .unwrap();
        assert_eq!(report.cataloged, 2);
        // Same bytes, same fast key, same digest: one catalog entry.
        assert_eq!(fixture.catalog.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_fast_key_collision_keeps_both_files() {
        // Two files identical through the 64KB fast-key prefix and equal in
        // size, but with different bytes past the prefix: distinct content,
        // so both must be cataloged. RAW bodies keep the fixture free of
        // image decoding.
        let tmp = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(&tmp);

        let mut first = vec![0x49, 0x49, 0x2A, 0x00]; // TIFF little-endian magic
        first.resize(70_000, 0x5A);
        let mut second = first.clone();
        second[68_000] = 0x7E;
        assert_ne!(first, second);

        let path_a = tmp.path().join("a.dng");
        let path_b = tmp.path().join("b.dng");
        fs::write(&path_a, &first).unwrap();
        fs::write(&path_b, &second).unwrap();

        let report = fixture
            .pipeline()
            .run(
                &[PhotoItem::local(path_a), PhotoItem::local(path_b)],
                None,
                None,
            )
            .unwrap();
        assert_eq!(report.cataloged, 2);
        assert!(report.failures.is_empty());

        let catalog = fixture.catalog.lock().unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.pending_count(), 0);
        assert_eq!(catalog.digests().count(), 2);
    }

    #[test]
    fn test_progress_reported_per_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(&tmp);

        let mut items = Vec::new();
        for i in 0..6u8 {
            let path = tmp.path().join(format!("p{i}.jpg"));
            write_jpeg(&path, i * 30);
            items.push(PhotoItem::local(path));
        }

        let mut events = Vec::new();
        fixture
            .pipeline()
            .run(
                &items,
                Some(&mut |p| {
                    events.push(match p {
                        ProcessProgress::Started { total } => format!("start:{total}"),
                        ProcessProgress::BatchComplete { processed, total } => {
                            format!("batch:{processed}/{total}")
                        }
                        ProcessProgress::Complete { cataloged, failed } => {
                            format!("done:{cataloged}/{failed}")
                        }
                    });
                }),
                None,
            )
            .unwrap();

        // batch_size is 4: two batches for six items.
        assert_eq!(events, vec!["start:6", "batch:4/6", "batch:6/6", "done:6/0"]);
    }

    #[test]
    fn test_cancellation_at_batch_boundary() {
        let tmp = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(&tmp);

        let path = tmp.path().join("p.jpg");
        write_jpeg(&path, 1);
        let items = vec![PhotoItem::local(path)];

        let token = CancelToken::new();
        token.cancel();

        let report = fixture.pipeline().run(&items, None, Some(&token)).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.cataloged, 0);
    }

    #[test]
    fn test_remote_object_ingest() {
        let tmp = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(&tmp);

        let img = image::RgbImage::from_pixel(16, 16, image::Rgb([9, 9, 9]));
        let mut bytes = Vec::new();
        image::codecs::jpeg::JpegEncoder::new(&mut bytes)
            .write_image(img.as_raw(), 16, 16, image::ExtendedColorType::Rgb8)
            .unwrap();
        let digest = hasher::digest_bytes(&bytes, HashAlgorithm::Md5);

        let item = PhotoItem::RemoteObject {
            digest: digest.clone(),
            format: PhotoFormat::Jpeg,
            bytes,
        };
        let report = fixture.pipeline().run(&[item], None, None).unwrap();
        assert_eq!(report.cataloged, 1);

        let catalog = fixture.catalog.lock().unwrap();
        assert!(catalog.contains(&digest));
        assert!(fixture.thumbnails.contains(&digest));
    }

    #[test]
    fn test_signature_checks() {
        assert!(matches_signature(PhotoFormat::Jpeg, &[0xFF, 0xD8, 0xFF, 0xE0]));
        assert!(!matches_signature(PhotoFormat::Jpeg, b"GIF89a"));
        assert!(matches_signature(
            PhotoFormat::Png,
            &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]
        ));
        assert!(matches_signature(
            PhotoFormat::Heif,
            b"\x00\x00\x00\x18ftypheic"
        ));
        assert!(matches_signature(PhotoFormat::Raw, b"II*\x00rest"));
        assert!(matches_signature(PhotoFormat::Raw, b"MM\x00*rest"));
        assert!(!matches_signature(PhotoFormat::Unknown, b"anything"));
    }
}
