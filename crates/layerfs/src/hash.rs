//! Content fingerprinting for change detection.
//!
//! Two byte streams compare equal iff their hashes compare equal (modulo the
//! astronomically unlikely BLAKE3 collision). `hash_file` streams the file
//! in fixed-size chunks rather than reading it whole, so hashing a large
//! `Source`-origin file during a background rescan doesn't balloon memory.

use std::io::{self, Read};
use std::path::Path;
use std::time::SystemTime;

use fs_err::File;
use serde::{Deserialize, Serialize};

const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// A content fingerprint plus the time it was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHash {
    digest: [u8; 32],
    pub captured_at: SystemTime,
}

impl FileHash {
    fn new(digest: blake3::Hash, captured_at: SystemTime) -> Self {
        FileHash {
            digest: *digest.as_bytes(),
            captured_at,
        }
    }

    /// First 8 hex characters, suitable for log lines.
    pub fn short(&self) -> String {
        self.digest[..4].iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn digest_bytes(&self) -> &[u8; 32] {
        &self.digest
    }
}

impl PartialEq<FileHash> for &FileHash {
    fn eq(&self, other: &FileHash) -> bool {
        self.digest == other.digest
    }
}

/// Hash a byte buffer already resident in memory (used for `Virtual` origin
/// files, where the bytes are supplied directly by a caller).
pub fn hash_bytes(buf: &[u8]) -> FileHash {
    let digest = blake3::hash(buf);
    FileHash::new(digest, SystemTime::now())
}

/// Hash a file on the host filesystem, streaming it in fixed-size chunks.
pub fn hash_file(path: &Path) -> io::Result<FileHash> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; STREAM_CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(FileHash::new(hasher.finalize(), SystemTime::now()))
}

/// True iff the two hashes were computed from identical byte streams.
pub fn hashes_equal(a: &FileHash, b: &FileHash) -> bool {
    a.digest == b.digest
}
