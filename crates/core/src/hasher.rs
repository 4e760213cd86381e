use std::io::Read;
use std::path::Path;

use md5::digest::DynDigest;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::domain::FastKey;

/// Prefix length hashed for the fast key. Fixed at 64KB for compatibility with
/// existing catalogs and remote objects.
pub const FAST_KEY_PREFIX_LEN: usize = 64 * 1024;

const CHUNK_SIZE: usize = 64 * 1024;

/// Content hash algorithm. MD5 is the default because existing snapshots and
/// remote object keys are MD5-addressed; SHA-256 is available for new
/// deployments that do not need wire compatibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl HashAlgorithm {
    fn hasher(&self) -> Box<dyn DynDigest> {
        match self {
            HashAlgorithm::Md5 => Box::new(Md5::default()),
            HashAlgorithm::Sha256 => Box::new(Sha256::default()),
        }
    }

    /// Length of the hex-encoded digest.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha256 => 64,
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Hash a byte slice already in memory.
pub fn digest_bytes(bytes: &[u8], algorithm: HashAlgorithm) -> String {
    let mut hasher = algorithm.hasher();
    hasher.update(bytes);
    to_hex(&hasher.finalize())
}

/// Compute the full content digest of a file using streaming I/O.
/// Reads in 64KB chunks to avoid loading large files entirely into memory.
pub fn compute_full_digest(path: &Path, algorithm: HashAlgorithm) -> std::io::Result<String> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::with_capacity(CHUNK_SIZE, file);
    let mut hasher = algorithm.hasher();
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(to_hex(&hasher.finalize()))
}

/// Compute the fast key for bytes already in memory: digest of the first
/// `FAST_KEY_PREFIX_LEN` bytes plus the total length.
pub fn fast_key_from_bytes(bytes: &[u8], algorithm: HashAlgorithm) -> FastKey {
    let head = &bytes[..bytes.len().min(FAST_KEY_PREFIX_LEN)];
    FastKey {
        head_digest: digest_bytes(head, algorithm),
        file_size: bytes.len() as u64,
    }
}

/// Compute the fast key for a file: digest of its first 64KB plus its total
/// size. O(1) relative to file size; used to short-circuit duplicate
/// detection before paying for a full-file hash.
pub fn compute_fast_key(path: &Path, algorithm: HashAlgorithm) -> std::io::Result<FastKey> {
    let file = std::fs::File::open(path)?;
    let file_size = file.metadata()?.len();

    let mut head = Vec::with_capacity(FAST_KEY_PREFIX_LEN.min(file_size as usize));
    file.take(FAST_KEY_PREFIX_LEN as u64).read_to_end(&mut head)?;

    Ok(FastKey {
        head_digest: digest_bytes(&head, algorithm),
        file_size,
    })
}

/// Check that a string looks like a hex digest of a known algorithm.
pub fn is_hex_digest(s: &str) -> bool {
    (s.len() == HashAlgorithm::Md5.hex_len() || s.len() == HashAlgorithm::Sha256.hex_len())
        && s.chars().all(|c| c.is_ascii_hexdigit())
}
