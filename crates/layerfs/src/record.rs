//! Per-path metadata held by a `Vfs`.
//!
//! The design document describes four parallel mappings (source, embed,
//! in-memory, origin) plus a hash table. We collapse those into one
//! `FileRecord` per path — the `Origin` enum already carries the
//! discriminant invariant 1 in `SPEC_FULL.md` requires ("exactly one of
//! {source, embed, in-memory} holds the backing data"), so a fifth map
//! keyed in parallel would only let the maps disagree with each other.

use std::path::PathBuf;

use crate::hash::FileHash;
use crate::origin::Origin;

/// A tombstone is a `Virtual` record with no in-memory bytes and no temp
/// file: it exists purely to shadow an ancestor's path.
#[derive(Debug, Clone)]
pub enum Backing {
    /// Bytes held directly in memory (not yet persisted to a temp file, or
    /// persisted and mirrored here for fast reads).
    Bytes(Vec<u8>),
    /// This path is a tombstone: deliberately deleted in this VFS, shadowing
    /// whatever an ancestor has at the same path.
    Tombstone,
}

#[derive(Debug, Clone)]
pub struct FileRecord {
    pub origin: Origin,
    pub hash: Option<FileHash>,
    /// Only meaningful for `Origin::Virtual`; `Source` and `Embed` records
    /// always read through `origin.host_path()`.
    pub backing: Option<Backing>,
}

impl FileRecord {
    pub fn source(host_path: PathBuf, hash: FileHash) -> Self {
        FileRecord {
            origin: Origin::Source { host_path },
            hash: Some(hash),
            backing: None,
        }
    }

    pub fn embed(host_path: PathBuf, hash: FileHash) -> Self {
        FileRecord {
            origin: Origin::Embed { host_path },
            hash: Some(hash),
            backing: None,
        }
    }

    pub fn virtual_file(host_path: PathBuf, bytes: Vec<u8>) -> Self {
        let hash = crate::hash::hash_bytes(&bytes);
        FileRecord {
            origin: Origin::Virtual { host_path },
            hash: Some(hash),
            backing: Some(Backing::Bytes(bytes)),
        }
    }

    pub fn tombstone(host_path: PathBuf) -> Self {
        FileRecord {
            origin: Origin::Virtual { host_path },
            hash: None,
            backing: Some(Backing::Tombstone),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.backing, Some(Backing::Tombstone))
    }
}
