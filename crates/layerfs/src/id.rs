//! Identifiers derived from a high-resolution time source, per §3 of the
//! design document ("a unique identifier derived from a high-resolution
//! time source"). A nanosecond timestamp alone can collide if two VFS
//! instances are created within the same tick on a coarse clock, so each id
//! also carries a process-wide monotonic counter to disambiguate.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_id_string(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{nanos:x}-{seq:x}")
}

/// Identifies one `scriptserve` process run. Shared by a root VFS and every
/// branch descended from it, so their temp directories nest under the same
/// `<configured-tempdir>/<instance-id>/` parent (§6, on-disk layout).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new() -> Self {
        InstanceId(next_id_string("inst"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one VFS within an instance; forms the leaf directory name
/// under `<configured-tempdir>/<instance-id>/<vfs-id>/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VfsId(String);

impl VfsId {
    pub fn new() -> Self {
        VfsId(next_id_string("vfs"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VfsId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VfsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_even_when_created_rapidly() {
        let ids: Vec<VfsId> = (0..100).map(|_| VfsId::new()).collect();
        let mut seen = std::collections::HashSet::new();
        for id in &ids {
            assert!(seen.insert(id.as_str().to_string()), "duplicate id: {id}");
        }
    }

    #[test]
    fn instance_and_vfs_ids_have_distinct_prefixes() {
        let instance = InstanceId::new();
        let vfs = VfsId::new();
        assert!(instance.as_str().starts_with("inst-"));
        assert!(vfs.as_str().starts_with("vfs-"));
    }
}
