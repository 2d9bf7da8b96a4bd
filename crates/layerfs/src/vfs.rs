//! The VFS instance itself (§4.3, §4.4) plus the branch/ref-count manager
//! (§4.5). This is the largest module in the crate, matching the design
//! document's 30%+12% share for these two components combined.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use fs_err as fs;
use walkdir::WalkDir;

use crate::branch::{self, CleanupState};
use crate::error::{Error, Result};
use crate::hash::FileHash;
use crate::id::{InstanceId, VfsId};
use crate::image::EmbeddedImage;
use crate::origin::Origin;
use crate::path;
use crate::record::FileRecord;
use crate::watch;

/// Map state guarded by one readers-writer lock (§5): origin, source/embed
/// temp-file locations (folded into `Origin`, see `record.rs`), the hash
/// table (folded into `FileRecord`), and the inherited-paths set.
pub(crate) struct VfsMaps {
    pub files: HashMap<String, FileRecord>,
    pub inherited_paths: HashSet<String>,
}

impl VfsMaps {
    fn new() -> Self {
        VfsMaps {
            files: HashMap::new(),
            inherited_paths: HashSet::new(),
        }
    }
}

pub(crate) struct VfsShared {
    pub(crate) id: VfsId,
    pub(crate) instance_id: InstanceId,
    pub(crate) parent: Option<Arc<VfsShared>>,
    pub(crate) maps: RwLock<VfsMaps>,
    cleanup_state: Mutex<CleanupState>,
    pub(crate) temp_dir: PathBuf,
    pub(crate) dev_mode: bool,
    watcher: Mutex<Option<watch::Handle>>,
}

/// A handle to one VFS instance. Cheap to clone (an `Arc` bump); every
/// clone refers to the same underlying namespace. Branches are distinct
/// `Vfs` values produced by `branch()`, not clones of this one.
#[derive(Clone)]
pub struct Vfs {
    pub(crate) shared: Arc<VfsShared>,
}

fn chain_contains(parent: &Arc<VfsShared>, id: &VfsId) -> bool {
    let mut current = Some(parent);
    while let Some(node) = current {
        if &node.id == id {
            return true;
        }
        current = node.parent.as_ref();
    }
    false
}

impl Vfs {
    /// Creates a new root VFS rooted at `temp_root/<instance-id>/<vfs-id>/`
    /// on the host filesystem for materialized blobs and wrapper scripts.
    pub fn new(temp_root: impl AsRef<Path>, dev_mode: bool) -> io::Result<Self> {
        let instance_id = InstanceId::new();
        Self::new_with_instance(temp_root, instance_id, dev_mode)
    }

    fn new_with_instance(
        temp_root: impl AsRef<Path>,
        instance_id: InstanceId,
        dev_mode: bool,
    ) -> io::Result<Self> {
        let id = VfsId::new();
        let temp_dir = temp_root
            .as_ref()
            .join(instance_id.as_str())
            .join(id.as_str());
        fs::create_dir_all(&temp_dir)?;

        let shared = Arc::new(VfsShared {
            id,
            instance_id,
            parent: None,
            maps: RwLock::new(VfsMaps::new()),
            cleanup_state: Mutex::new(CleanupState::default()),
            temp_dir,
            dev_mode,
            watcher: Mutex::new(None),
        });

        if dev_mode {
            *shared.watcher.lock().unwrap() = Some(watch::spawn(Arc::clone(&shared)));
        }

        Ok(Vfs { shared })
    }

    /// Produces a child VFS pinning `self` alive. Returns `None` if `self`
    /// has already been marked for cleanup (§4.5).
    pub fn branch(&self) -> Option<Vfs> {
        {
            let mut state = self.shared.cleanup_state.lock().unwrap();
            if state.cleaned_up {
                return None;
            }
            state.refcount += 1;
        }

        let id = VfsId::new();
        debug_assert!(
            !chain_contains(&self.shared, &id),
            "freshly generated vfs id unexpectedly collided with an ancestor"
        );

        let temp_dir = self
            .shared
            .temp_dir
            .parent()
            .unwrap_or(&self.shared.temp_dir)
            .join(id.as_str());

        if let Err(err) = fs::create_dir_all(&temp_dir) {
            log::error!("failed to create branch temp dir {}: {err}", temp_dir.display());
            // Roll back the refcount bump we already made.
            let mut state = self.shared.cleanup_state.lock().unwrap();
            state.refcount = state.refcount.saturating_sub(1);
            return None;
        }

        let child_shared = Arc::new(VfsShared {
            id,
            instance_id: self.shared.instance_id.clone(),
            parent: Some(Arc::clone(&self.shared)),
            maps: RwLock::new(VfsMaps::new()),
            cleanup_state: Mutex::new(CleanupState::default()),
            temp_dir,
            dev_mode: self.shared.dev_mode,
            watcher: Mutex::new(None),
        });

        if child_shared.dev_mode {
            *child_shared.watcher.lock().unwrap() = Some(watch::spawn(Arc::clone(&child_shared)));
        }

        Some(Vfs { shared: child_shared })
    }

    /// Marks this VFS for teardown (idempotent). See `branch.rs` for the
    /// two-phase mark/complete split and the reaper-thread hand-off that
    /// replaces the original implementation's cleanup timer.
    pub fn cleanup(&self) {
        if let Some(handle) = self.shared.watcher.lock().unwrap().take() {
            handle.stop();
        }

        let self_now_empty = {
            let mut state = self.shared.cleanup_state.lock().unwrap();
            if state.cleaned_up {
                return;
            }
            state.cleaned_up = true;
            state.refcount == 0
        };

        if self_now_empty {
            let shared = Arc::clone(&self.shared);
            branch::schedule(move || complete_cleanup(shared));
        }

        if let Some(parent) = &self.shared.parent {
            let parent_shared = Arc::clone(parent);
            let parent_ready = {
                let mut pstate = parent_shared.cleanup_state.lock().unwrap();
                pstate.refcount = pstate.refcount.saturating_sub(1);
                pstate.refcount == 0 && pstate.cleaned_up
            };
            if parent_ready {
                branch::schedule(move || complete_cleanup(parent_shared));
            }
        }
    }

    /// For tests: true once this VFS's temp directory has actually been
    /// removed by `complete_cleanup`.
    pub fn is_torn_down(&self) -> bool {
        !self.shared.temp_dir.exists()
    }

    pub fn refcount(&self) -> usize {
        self.shared.cleanup_state.lock().unwrap().refcount
    }

    pub fn id(&self) -> &VfsId {
        &self.shared.id
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.shared.instance_id
    }

    /// Rejects mutating calls made after `cleanup()` has marked this VFS
    /// (§7's `AlreadyCleanedUp`). Reads still fall through to
    /// `resolve_origin`, which has its own not-found handling; only the
    /// operations that would otherwise write into a temp directory on its
    /// way out need this guard.
    fn ensure_live(&self) -> Result<()> {
        if self.shared.cleanup_state.lock().unwrap().cleaned_up {
            return Err(Error::AlreadyCleanedUp);
        }
        Ok(())
    }

    fn materialize(&self, canonical: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let relative = canonical.trim_start_matches('/');
        let host_path = self.shared.temp_dir.join("files").join(relative);
        if let Some(dir) = host_path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&host_path, bytes)?;
        Ok(host_path)
    }

    // ---- registration ----

    pub fn add_source(&self, host: &Path, vpath: &str) -> Result<()> {
        self.ensure_live()?;
        let metadata = fs::symlink_metadata(host).map_err(|e| Error::host_io(host, e))?;
        if metadata.file_type().is_symlink() {
            return Err(Error::security_violation(host));
        }
        if !metadata.is_file() {
            return Err(Error::invalid_argument(format!(
                "{} is not a regular file",
                host.display()
            )));
        }

        let hash = crate::hash::hash_file(host).map_err(|e| Error::host_io(host, e))?;
        let canonical = path::normalize(vpath);

        let mut maps = self.shared.maps.write().unwrap();
        maps.files
            .insert(canonical.clone(), FileRecord::source(host.to_path_buf(), hash));
        maps.inherited_paths.remove(&canonical);
        Ok(())
    }

    /// Recursively registers files under `host_dir` whose extension is one
    /// of `extensions` (case-insensitive, without the leading dot) as
    /// `Source` files under `vprefix`. Per-entry failures (including a
    /// symlinked entry inside the tree) are logged and skipped; the call as
    /// a whole only fails if `host_dir` itself cannot be scanned at all.
    pub fn add_source_dir(&self, host_dir: &Path, vprefix: &str, extensions: &[&str]) -> Result<()> {
        self.ensure_live()?;
        let top_metadata = fs::symlink_metadata(host_dir).map_err(|e| Error::host_io(host_dir, e))?;
        if top_metadata.file_type().is_symlink() {
            return Err(Error::security_violation(host_dir));
        }

        let extensions: HashSet<String> = extensions.iter().map(|e| e.to_lowercase()).collect();

        for entry in WalkDir::new(host_dir).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("add_source_dir: failed to read entry under {}: {err}", host_dir.display());
                    continue;
                }
            };

            if entry.file_type().is_symlink() {
                log::warn!("add_source_dir: skipping symlink {}", entry.path().display());
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            let matches_ext = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| extensions.contains(&e.to_lowercase()))
                .unwrap_or(false);
            if !matches_ext {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(host_dir)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            let vpath = path::join(vprefix, &relative);

            if let Err(err) = self.add_source(entry.path(), &vpath) {
                log::warn!("add_source_dir: failed to add {}: {err}", entry.path().display());
            }
        }

        Ok(())
    }

    pub fn add_embedded(&self, image: &EmbeddedImage, fs_path: &str, vpath: &str) -> Result<()> {
        self.ensure_live()?;
        let bytes = image.read(fs_path)?.to_vec();
        let canonical = path::normalize(vpath);
        let host_path = self
            .materialize(&canonical, &bytes)
            .map_err(|e| Error::host_io(canonical.clone(), e))?;
        let hash = crate::hash::hash_bytes(&bytes);

        let mut maps = self.shared.maps.write().unwrap();
        maps.files.insert(canonical.clone(), FileRecord::embed(host_path, hash));
        maps.inherited_paths.remove(&canonical);
        Ok(())
    }

    pub fn add_embedded_dir(&self, image: &EmbeddedImage, fs_dir: &str, vprefix: &str) -> Result<()> {
        let entries = image.list_dir(fs_dir)?;
        for relative in entries {
            let fs_path = format!("{}/{}", fs_dir.trim_end_matches('/'), relative);
            let vpath = path::join(vprefix, &relative);
            if let Err(err) = self.add_embedded(image, &fs_path, &vpath) {
                log::warn!("add_embedded_dir: failed to add {fs_path}: {err}");
            }
        }
        Ok(())
    }

    pub fn create_virtual(&self, vpath: &str, bytes: impl Into<Vec<u8>>) -> Result<()> {
        self.ensure_live()?;
        let canonical = path::normalize(vpath);
        if canonical == "/" {
            return Err(Error::invalid_argument("cannot create a virtual file at the root"));
        }
        let bytes = bytes.into();
        let host_path = self
            .materialize(&canonical, &bytes)
            .map_err(|e| Error::host_io(canonical.clone(), e))?;

        let mut maps = self.shared.maps.write().unwrap();
        maps.files
            .insert(canonical.clone(), FileRecord::virtual_file(host_path, bytes));
        maps.inherited_paths.remove(&canonical);
        Ok(())
    }

    // ---- reads ----

    /// Resolves a virtual path to its terminal (non-`Inherited`) origin,
    /// delegating to the parent when absent locally and recording the
    /// delegation in `inherited_paths`. In development mode, a local
    /// `Source` match is opportunistically rehashed here (§4.6).
    ///
    /// Hazard (§9 open question b, preserved deliberately): the read lock
    /// is dropped before the on-access rehash's I/O and before recursing
    /// into the parent. A concurrent writer can observe or produce a
    /// different record in between; callers that need a stable origin
    /// across multiple operations must not rely on two successive calls
    /// agreeing and should treat each call's result as a snapshot.
    fn resolve_origin(&self, vpath: &str) -> Result<Origin> {
        let canonical = path::normalize(vpath);

        let local = {
            let maps = self.shared.maps.read().unwrap();
            maps.files.get(&canonical).cloned()
        };

        if let Some(record) = local {
            if record.is_tombstone() {
                return Err(Error::not_found(canonical));
            }
            if self.shared.dev_mode {
                if let Origin::Source { host_path } = &record.origin {
                    watch::recheck_source(&self.shared, &canonical, host_path);
                }
            }
            return Ok(record.origin);
        }

        {
            let mut maps = self.shared.maps.write().unwrap();
            maps.inherited_paths.insert(canonical.clone());
        }

        match &self.shared.parent {
            Some(parent) => {
                let parent_vfs = Vfs { shared: Arc::clone(parent) };
                parent_vfs.resolve_origin(&canonical)
            }
            None => Err(Error::not_found(canonical)),
        }
    }

    pub fn get_content(&self, vpath: &str) -> Result<Vec<u8>> {
        let origin = self.resolve_origin(vpath)?;
        let host_path = origin
            .host_path()
            .ok_or_else(|| Error::not_found(path::normalize(vpath)))?;
        fs::read(host_path).map_err(|e| Error::host_io(host_path.clone(), e))
    }

    pub fn resolve_path(&self, vpath: &str) -> Result<PathBuf> {
        let origin = self.resolve_origin(vpath)?;
        origin
            .host_path()
            .cloned()
            .ok_or_else(|| Error::not_found(path::normalize(vpath)))
    }

    /// Identical lookup to `resolve_path`; the "literal" framing only
    /// matters one layer up, in the dispatcher (§4.9 step 2), where it is
    /// the final fallback after a `{param}`-aware regex sibling match. The
    /// VFS itself always keys on the literal canonical string.
    pub fn resolve_path_literal(&self, vpath: &str) -> Result<PathBuf> {
        self.resolve_path(vpath)
    }

    pub fn file_exists(&self, vpath: &str) -> bool {
        self.resolve_origin(vpath).is_ok()
    }

    pub fn list_files(&self) -> Vec<String> {
        let mut set: BTreeSet<String> = BTreeSet::new();

        if let Some(parent) = &self.shared.parent {
            let parent_vfs = Vfs { shared: Arc::clone(parent) };
            for path in parent_vfs.list_files() {
                set.insert(path);
            }
        }

        let maps = self.shared.maps.read().unwrap();
        for (path, record) in maps.files.iter() {
            if record.is_tombstone() {
                set.remove(path);
            } else {
                set.insert(path.clone());
            }
        }

        set.into_iter().collect()
    }

    // ---- copy / move / delete ----

    pub fn copy(&self, src: &str, dst: &str, preserve_origin: bool) -> Result<()> {
        self.ensure_live()?;
        let dst_canonical = path::normalize(dst);

        if preserve_origin {
            let origin = self.resolve_origin(src)?;
            let hash = {
                let maps = self.shared.maps.read().unwrap();
                maps.files.get(&path::normalize(src)).and_then(|r| r.hash)
            };
            let record = FileRecord {
                origin,
                hash,
                backing: None,
            };
            let mut maps = self.shared.maps.write().unwrap();
            maps.files.insert(dst_canonical.clone(), record);
            maps.inherited_paths.remove(&dst_canonical);
            Ok(())
        } else {
            let bytes = self.get_content(src)?;
            self.create_virtual(&dst_canonical, bytes)
        }
    }

    pub fn move_file(&self, src: &str, dst: &str, preserve_origin: bool) -> Result<()> {
        self.copy(src, dst, preserve_origin)?;
        self.delete(src)
    }

    pub fn delete(&self, vpath: &str) -> Result<()> {
        self.ensure_live()?;
        let canonical = path::normalize(vpath);

        if self.shared.parent.is_some() {
            if !self.file_exists(&canonical) {
                return Err(Error::not_found(canonical));
            }
            let mut maps = self.shared.maps.write().unwrap();
            maps.files.insert(canonical.clone(), FileRecord::tombstone(self.shared.temp_dir.clone()));
            maps.inherited_paths.remove(&canonical);
            Ok(())
        } else {
            let mut maps = self.shared.maps.write().unwrap();
            match maps.files.remove(&canonical) {
                Some(record) => {
                    if let Some(host_path) = record.origin.host_path() {
                        if record.origin.kind_name() != "source" {
                            let _ = fs::remove_file(host_path);
                        }
                    }
                    Ok(())
                }
                None => Err(Error::not_found(canonical)),
            }
        }
    }
}

fn complete_cleanup(shared: Arc<VfsShared>) {
    {
        let mut state = shared.cleanup_state.lock().unwrap();
        if state.completed || !state.cleaned_up || state.refcount != 0 {
            return;
        }
        state.completed = true;
    }

    if let Err(err) = fs::remove_dir_all(&shared.temp_dir) {
        if err.kind() != io::ErrorKind::NotFound {
            log::warn!("failed to remove vfs temp dir {}: {err}", shared.temp_dir.display());
        }
    }

    let mut maps = shared.maps.write().unwrap();
    maps.files.clear();
    maps.inherited_paths.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let start = Instant::now();
        while !cond() {
            if start.elapsed() > Duration::from_secs(2) {
                panic!("condition never became true");
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn simple_virtual_read() {
        let tmp = tempfile::tempdir().unwrap();
        let vfs = Vfs::new(tmp.path(), false).unwrap();

        vfs.create_virtual("/a.tpl", b"hello".to_vec()).unwrap();
        assert_eq!(vfs.get_content("/a.tpl").unwrap(), b"hello");
        assert!(vfs.file_exists("/a.tpl"));
        assert!(!vfs.file_exists("/missing"));
    }

    #[test]
    fn parent_child_shadowing() {
        let tmp = tempfile::tempdir().unwrap();
        let parent = Vfs::new(tmp.path(), false).unwrap();
        parent.create_virtual("/x", b"P".to_vec()).unwrap();

        let child = parent.branch().unwrap();
        assert_eq!(child.get_content("/x").unwrap(), b"P");

        child.create_virtual("/x", b"C".to_vec()).unwrap();
        assert_eq!(child.get_content("/x").unwrap(), b"C");
        assert_eq!(parent.get_content("/x").unwrap(), b"P");

        child.delete("/x").unwrap();
        assert!(!child.file_exists("/x"));
        assert!(parent.file_exists("/x"));

        child.cleanup();
        parent.cleanup();
    }

    #[test]
    fn origin_preserving_copy_tracks_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let host_file = tmp.path().join("t.lua");
        fs::write(&host_file, "V1").unwrap();

        let vfs = Vfs::new(tmp.path().join("vfs-root"), true).unwrap();
        vfs.add_source(&host_file, "/s").unwrap();
        vfs.copy("/s", "/d1", true).unwrap();
        vfs.copy("/s", "/d2", false).unwrap();

        fs::write(&host_file, "V2").unwrap();
        // Force the on-access recheck by resolving again (dev mode is on).
        wait_until(|| vfs.get_content("/s").unwrap() == b"V2");

        assert_eq!(vfs.get_content("/s").unwrap(), b"V2");
        assert_eq!(vfs.get_content("/d1").unwrap(), b"V2");
        assert_eq!(vfs.get_content("/d2").unwrap(), b"V1");

        vfs.cleanup();
    }

    #[test]
    fn deferred_cleanup_waits_for_children() {
        let tmp = tempfile::tempdir().unwrap();
        let parent = Vfs::new(tmp.path(), false).unwrap();
        let child1 = parent.branch().unwrap();
        let child2 = parent.branch().unwrap();

        assert_eq!(parent.refcount(), 2);

        parent.cleanup();
        assert!(!parent.is_torn_down(), "parent temp dir should persist while children are live");

        child1.cleanup();
        assert!(!parent.is_torn_down());

        child2.cleanup();
        wait_until(|| parent.is_torn_down());
        wait_until(|| parent.refcount() == 0);
    }

    #[test]
    fn branch_after_cleanup_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let vfs = Vfs::new(tmp.path(), false).unwrap();
        vfs.cleanup();
        assert!(vfs.branch().is_none());
    }

    #[test]
    fn mutation_after_cleanup_is_already_cleaned_up() {
        let tmp = tempfile::tempdir().unwrap();
        let vfs = Vfs::new(tmp.path(), false).unwrap();
        vfs.cleanup();

        let err = vfs.create_virtual("/late", b"x".to_vec()).unwrap_err();
        assert!(matches!(err, Error::AlreadyCleanedUp));
    }

    #[test]
    fn symlink_source_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("real.lua");
        fs::write(&target, "x").unwrap();
        let link = tmp.path().join("link.lua");

        #[cfg(unix)]
        std::os::unix::fs::symlink(&target, &link).unwrap();
        #[cfg(unix)]
        {
            let vfs = Vfs::new(tmp.path().join("vfs"), false).unwrap();
            let err = vfs.add_source(&link, "/s").unwrap_err();
            assert!(matches!(err, Error::SecurityViolation { .. }));
        }
    }

    #[test]
    fn list_files_unions_and_respects_shadowing() {
        let tmp = tempfile::tempdir().unwrap();
        let parent = Vfs::new(tmp.path(), false).unwrap();
        parent.create_virtual("/a", b"1".to_vec()).unwrap();
        parent.create_virtual("/b", b"2".to_vec()).unwrap();

        let child = parent.branch().unwrap();
        child.create_virtual("/c", b"3".to_vec()).unwrap();
        child.delete("/b").unwrap();

        let mut files = child.list_files();
        files.sort();
        assert_eq!(files, vec!["/a", "/c"]);

        let mut parent_files = parent.list_files();
        parent_files.sort();
        assert_eq!(parent_files, vec!["/a", "/b"]);
    }

    #[test]
    fn move_copies_then_deletes_source() {
        let tmp = tempfile::tempdir().unwrap();
        let vfs = Vfs::new(tmp.path(), false).unwrap();
        vfs.create_virtual("/src", b"data".to_vec()).unwrap();

        vfs.move_file("/src", "/dst", false).unwrap();
        assert!(!vfs.file_exists("/src"));
        assert_eq!(vfs.get_content("/dst").unwrap(), b"data");
    }

    #[test]
    fn delete_missing_path_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let vfs = Vfs::new(tmp.path(), false).unwrap();
        let err = vfs.delete("/nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn chain_contains_detects_ancestors() {
        let tmp = tempfile::tempdir().unwrap();
        let grandparent = Vfs::new(tmp.path(), false).unwrap();
        let parent = grandparent.branch().unwrap();
        let child = parent.branch().unwrap();

        assert!(chain_contains(&child.shared.parent.clone().unwrap(), &parent.shared.id));
        assert!(chain_contains(&child.shared.parent.clone().unwrap(), &grandparent.shared.id));
        assert!(!chain_contains(&child.shared.parent.clone().unwrap(), &child.shared.id));
    }
}
