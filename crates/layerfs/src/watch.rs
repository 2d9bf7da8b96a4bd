//! Change detector (§4.6): a background thread that periodically rehashes
//! every `Source`-origin file and updates its cached hash when the content
//! changed, plus an on-access recheck helper used by `resolve_origin` when a
//! VFS is running in development mode.
//!
//! The original cleanup timer was replaced with the reaper hand-off in
//! `branch.rs`; this detector keeps the opposite shape it already had in the
//! design document (a polling loop), since `notify`-style event watching
//! isn't part of the spec this crate implements — §4.6 calls for a fixed
//! ~500ms tick, not OS filesystem events.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};

use crate::hash;
use crate::origin::Origin;
use crate::vfs::VfsShared;

const TICK_INTERVAL: Duration = Duration::from_millis(500);

pub(crate) struct Handle {
    stop_tx: Sender<()>,
    thread: Option<jod_thread::JoinHandle<()>>,
}

impl Handle {
    pub(crate) fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            thread.join();
        }
    }
}

pub(crate) fn spawn(shared: Arc<VfsShared>) -> Handle {
    let (stop_tx, stop_rx) = unbounded::<()>();

    let thread = jod_thread::Builder::new()
        .name("layerfs-watch".to_string())
        .spawn(move || loop {
            match stop_rx.recv_timeout(TICK_INTERVAL) {
                Ok(()) => break,
                Err(RecvTimeoutError::Timeout) => tick(&shared),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        })
        .expect("failed to spawn layerfs change detector thread");

    Handle {
        stop_tx,
        thread: Some(thread),
    }
}

fn tick(shared: &Arc<VfsShared>) {
    let sources: Vec<(String, std::path::PathBuf)> = {
        let maps = shared.maps.read().unwrap();
        maps.files
            .iter()
            .filter_map(|(path, record)| match &record.origin {
                Origin::Source { host_path } => Some((path.clone(), host_path.clone())),
                _ => None,
            })
            .collect()
    };

    for (path, host_path) in sources {
        recheck_source(shared, &path, &host_path);
    }
}

/// Rehashes a single `Source` record and updates its cached hash if the
/// content changed. Used both by the periodic tick above and, in
/// development mode, opportunistically on access (`vfs::resolve_origin`).
pub(crate) fn recheck_source(shared: &VfsShared, canonical: &str, host_path: &Path) {
    let new_hash = match hash::hash_file(host_path) {
        Ok(h) => h,
        Err(err) => {
            log::debug!("change detector: failed to stat/hash {}: {err}", host_path.display());
            return;
        }
    };

    let mut maps = shared.maps.write().unwrap();
    if let Some(record) = maps.files.get_mut(canonical) {
        if matches!(record.origin, Origin::Source { .. }) {
            let changed = match record.hash {
                Some(old) => !hash::hashes_equal(&old, &new_hash),
                None => true,
            };
            if changed {
                record.hash = Some(new_hash);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::Vfs;
    use std::fs;
    use std::time::Instant;

    #[test]
    fn periodic_tick_picks_up_disk_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let host_file = tmp.path().join("f.lua");
        fs::write(&host_file, "one").unwrap();

        let vfs = Vfs::new(tmp.path().join("vfs-root"), true).unwrap();
        vfs.add_source(&host_file, "/f").unwrap();
        assert_eq!(vfs.get_content("/f").unwrap(), b"one");

        fs::write(&host_file, "two").unwrap();

        let start = Instant::now();
        loop {
            if vfs.get_content("/f").unwrap() == b"two" {
                break;
            }
            if start.elapsed() > Duration::from_secs(2) {
                panic!("change detector never picked up the update");
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        vfs.cleanup();
    }
}
