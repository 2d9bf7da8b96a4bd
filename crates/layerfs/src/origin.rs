//! The tagged variant describing where a logical file's bytes come from.

use std::path::PathBuf;

/// Where a logical file's bytes come from.
///
/// `Inherited` is a placeholder: it marks that a path was last resolved by
/// delegating to the parent VFS. It is never returned from `Vfs::origin_of`
/// to an external caller of `get_content`/`resolve_path` — those methods
/// resolve straight through to the real origin, recording the delegation in
/// the inherited-paths set instead (see `vfs.rs`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// A reference to a path on the host filesystem. Hash is rechecked by
    /// the change detector and (in development mode) on access.
    Source { host_path: PathBuf },

    /// Content extracted once from the compiled-in embedded image into a
    /// per-VFS temp file. The temp file never changes after extraction.
    Embed { host_path: PathBuf },

    /// Bytes supplied directly by a caller and persisted to a per-VFS temp
    /// file. `None` bytes at the owning VFS's virtual-file map means this
    /// path is a tombstone shadowing an ancestor, not a real `Virtual` file.
    Virtual { host_path: PathBuf },

    /// Resolution for this path was last delegated to the parent VFS. Not a
    /// terminal origin: resolving it further means asking the parent.
    Inherited,
}

impl Origin {
    pub fn host_path(&self) -> Option<&PathBuf> {
        match self {
            Origin::Source { host_path } | Origin::Embed { host_path } | Origin::Virtual { host_path } => {
                Some(host_path)
            }
            Origin::Inherited => None,
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, Origin::Source { .. })
    }

    pub fn is_inherited(&self) -> bool {
        matches!(self, Origin::Inherited)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Origin::Source { .. } => "source",
            Origin::Embed { .. } => "embed",
            Origin::Virtual { .. } => "virtual",
            Origin::Inherited => "inherited",
        }
    }
}
