//! Branch / reference-count manager (§4.5).
//!
//! Teardown is two-phase: `mark` flips a flag and decrements the parent's
//! count; `complete` actually removes the temp directory and releases the
//! maps, and only runs once the VFS's own refcount has reached zero *and*
//! it has been marked. Open question (a) in the design document replaces
//! the original "schedule complete-cleanup after a short delay" approach
//! with a lock-ordered hand-off to a dedicated reaper thread: each
//! completion attempt is a job sent down a channel rather than a sleep, so
//! a long bottom-up teardown chain runs as a sequence of small jobs instead
//! of recursing on the caller's stack.

use std::sync::{Mutex, OnceLock};

use crossbeam_channel::Sender;

/// Refcount + cleaned-up flag, guarded by one mutex distinct from the
/// map-state lock (§5's lock-ordering rule: map lock first, then this one,
/// never the reverse — callers must never be holding the map write lock
/// when they touch this).
#[derive(Debug, Default)]
pub struct CleanupState {
    pub refcount: usize,
    pub cleaned_up: bool,
    /// Set once `complete_cleanup` has actually run, so a completion job
    /// that races with another is a safe no-op rather than a double-free.
    pub completed: bool,
}

impl CleanupState {
    pub fn new() -> Mutex<Self> {
        Mutex::new(CleanupState::default())
    }
}

type Job = Box<dyn FnOnce() + Send>;

fn reaper() -> &'static Sender<Job> {
    static REAPER: OnceLock<Sender<Job>> = OnceLock::new();
    REAPER.get_or_init(|| {
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        std::thread::Builder::new()
            .name("layerfs-reaper".to_string())
            .spawn(move || {
                for job in rx {
                    job();
                }
            })
            .expect("failed to spawn layerfs reaper thread");
        tx
    })
}

/// Hand a completion attempt off to the reaper thread instead of running it
/// (and any cascade it triggers) on the caller's stack.
pub fn schedule(job: impl FnOnce() + Send + 'static) {
    let _ = reaper().send(Box::new(job));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn scheduled_jobs_run_off_the_caller_thread() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        schedule(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let mut waited = Duration::ZERO;
        while counter.load(Ordering::SeqCst) == 0 && waited < Duration::from_secs(2) {
            std::thread::sleep(Duration::from_millis(10));
            waited += Duration::from_millis(10);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
