//! Directory watch backends.
//!
//! A [`WatchBackend`] registers non-recursive watches on single directories
//! and reports the names that appeared in each one since the last drain.
//! The watch chain only ever talks to this trait.
//!
//! - [`NotifyBackend`]: kernel notifications via `notify`
//! - [`ListingBackend`]: diffs of directory listings, for filesystems without
//!   change notification (NFS and similar mounts)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use smallvec::SmallVec;
use snapfeed_core::{FxHashMap, FxHashSet, WatchBackendKind, fx_hash_map};
use snapfeed_discovery::list_entry_names;
use tracing::{debug, trace, warn};

use crate::error::WatchError;
use crate::events::created_entries;

/// Names drained from one directory. Usually zero or one per cycle.
pub type CreatedNames = SmallVec<[String; 4]>;

/// A set of single-directory watches.
pub trait WatchBackend: Send {
    /// Starts watching `dir` for new entries.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::PathNotFound`] if `dir` does not exist, or
    /// [`WatchError::Registration`] if the backend refuses the watch.
    fn watch(&mut self, dir: &Utf8Path) -> Result<(), WatchError>;

    /// Stops watching `dir` and discards anything buffered for it.
    fn unwatch(&mut self, dir: &Utf8Path);

    /// Returns the names created in `dir` since the previous drain.
    fn drain_created(&mut self, dir: &Utf8Path) -> CreatedNames;

    /// Returns `true`, once, if events may have been lost since the last call.
    ///
    /// The caller must then re-list everything it watches.
    fn take_rescan(&mut self) -> bool {
        false
    }
}

/// Creates a backend of the configured kind.
///
/// # Errors
///
/// Returns [`WatchError::Notify`] if the native watcher cannot be created.
pub fn create_backend(kind: WatchBackendKind) -> Result<Box<dyn WatchBackend>, WatchError> {
    Ok(match kind {
        WatchBackendKind::Native => Box::new(NotifyBackend::new()?),
        WatchBackendKind::Listing => Box::new(ListingBackend::new()),
    })
}

type EventBuffers = Arc<Mutex<FxHashMap<Utf8PathBuf, CreatedNames>>>;

/// Watches directories with the platform's native notification mechanism.
///
/// The notify callback runs on notify's own thread and appends created names
/// to a per-directory buffer; [`drain_created`](WatchBackend::drain_created)
/// takes the buffer. Events for directories that are not (or no longer)
/// watched are dropped. Watcher errors and queue overflows raise the rescan
/// flag reported by [`take_rescan`](WatchBackend::take_rescan).
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
    buffers: EventBuffers,
    rescan: Arc<AtomicBool>,
}

impl std::fmt::Debug for NotifyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyBackend")
            .field("watched", &self.buffers.lock().len())
            .finish_non_exhaustive()
    }
}

impl NotifyBackend {
    /// Creates a backend with no watches.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Notify`] if the platform watcher fails to start.
    pub fn new() -> Result<Self, WatchError> {
        let buffers: EventBuffers = Arc::new(Mutex::new(fx_hash_map()));
        let rescan = Arc::new(AtomicBool::new(false));
        let sink = Arc::clone(&buffers);
        let lost = Arc::clone(&rescan);
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if event.need_rescan() => {
                warn!("Watch event queue overflowed, rescan needed");
                lost.store(true, Ordering::Release);
            }
            Ok(event) => record_event(&sink, &event),
            Err(error) => {
                warn!(error = %error, "Watch backend error, rescan needed");
                lost.store(true, Ordering::Release);
            }
        })?;
        Ok(Self {
            watcher,
            buffers,
            rescan,
        })
    }
}

fn record_event(buffers: &EventBuffers, event: &Event) {
    let entries = created_entries(event);
    if entries.is_empty() {
        return;
    }
    let mut buffers = buffers.lock();
    for entry in entries {
        match buffers.get_mut(&entry.dir) {
            Some(names) => names.push(entry.name),
            None => trace!(dir = %entry.dir, name = %entry.name, "Event for unwatched directory"),
        }
    }
}

impl WatchBackend for NotifyBackend {
    fn watch(&mut self, dir: &Utf8Path) -> Result<(), WatchError> {
        if !dir.is_dir() {
            return Err(WatchError::path_not_found(dir));
        }
        // The buffer must exist before the first event can arrive.
        self.buffers.lock().entry(dir.to_owned()).or_default();
        if let Err(source) = self.watcher.watch(dir.as_std_path(), RecursiveMode::NonRecursive) {
            self.buffers.lock().remove(dir);
            return Err(WatchError::registration(dir, source));
        }
        trace!(dir = %dir, "Watch registered");
        Ok(())
    }

    fn unwatch(&mut self, dir: &Utf8Path) {
        self.buffers.lock().remove(dir);
        if let Err(error) = self.watcher.unwatch(dir.as_std_path()) {
            // The directory may already be gone, which removes the watch too.
            debug!(dir = %dir, error = %error, "Unwatch failed");
        }
    }

    fn drain_created(&mut self, dir: &Utf8Path) -> CreatedNames {
        self.buffers
            .lock()
            .get_mut(dir)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    fn take_rescan(&mut self) -> bool {
        self.rescan.swap(false, Ordering::AcqRel)
    }
}

/// Emulates watches by diffing directory listings.
///
/// Each drain lists the directory and reports names absent from the previous
/// listing. A name that disappears and comes back is reported again.
#[derive(Debug, Default)]
pub struct ListingBackend {
    seen: FxHashMap<Utf8PathBuf, FxHashSet<String>>,
}

impl ListingBackend {
    /// Creates a backend with no watches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of watched directories.
    #[must_use]
    pub fn watched_count(&self) -> usize {
        self.seen.len()
    }
}

impl WatchBackend for ListingBackend {
    fn watch(&mut self, dir: &Utf8Path) -> Result<(), WatchError> {
        if !dir.is_dir() {
            return Err(WatchError::path_not_found(dir));
        }
        let names = list_entry_names(dir)?;
        self.seen.insert(dir.to_owned(), names.into_iter().collect());
        Ok(())
    }

    fn unwatch(&mut self, dir: &Utf8Path) {
        self.seen.remove(dir);
    }

    fn drain_created(&mut self, dir: &Utf8Path) -> CreatedNames {
        let Some(seen) = self.seen.get_mut(dir) else {
            return CreatedNames::new();
        };
        let current: FxHashSet<String> = match list_entry_names(dir) {
            Ok(names) => names.into_iter().collect(),
            Err(error) => {
                warn!(dir = %dir, error = %error, "Listing watched directory failed");
                return CreatedNames::new();
            }
        };
        let created = current
            .iter()
            .filter(|name| !seen.contains(*name))
            .cloned()
            .collect();
        *seen = current;
        created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn utf8_root(temp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap()
    }

    #[test]
    fn test_listing_reports_only_new_names() {
        let temp = TempDir::new().unwrap();
        let dir = utf8_root(&temp);
        fs::write(dir.join("100.dat"), b"x").unwrap();

        let mut backend = ListingBackend::new();
        backend.watch(&dir).unwrap();
        assert!(backend.drain_created(&dir).is_empty());

        fs::write(dir.join("200.dat"), b"x").unwrap();
        let created = backend.drain_created(&dir);
        assert_eq!(created.as_slice(), ["200.dat".to_owned()]);
        assert!(backend.drain_created(&dir).is_empty());
    }

    #[test]
    fn test_listing_rename_counts_as_created() {
        let temp = TempDir::new().unwrap();
        let dir = utf8_root(&temp);
        let mut backend = ListingBackend::new();
        backend.watch(&dir).unwrap();

        fs::write(dir.join("300.dat.tmp"), b"x").unwrap();
        assert_eq!(backend.drain_created(&dir).len(), 1);
        fs::rename(dir.join("300.dat.tmp"), dir.join("300.dat")).unwrap();
        assert_eq!(backend.drain_created(&dir).as_slice(), ["300.dat".to_owned()]);
    }

    #[test]
    fn test_listing_unwatch_forgets() {
        let temp = TempDir::new().unwrap();
        let dir = utf8_root(&temp);
        let mut backend = ListingBackend::new();
        backend.watch(&dir).unwrap();
        backend.unwatch(&dir);
        fs::write(dir.join("1.dat"), b"x").unwrap();
        assert!(backend.drain_created(&dir).is_empty());
        assert_eq!(backend.watched_count(), 0);
    }

    #[test]
    fn test_watch_missing_dir_fails() {
        let temp = TempDir::new().unwrap();
        let missing = utf8_root(&temp).join("absent");
        let mut backend = ListingBackend::new();
        assert!(matches!(backend.watch(&missing), Err(WatchError::PathNotFound(_))));
    }

    #[test]
    fn test_notify_backend_sees_creation() {
        let temp = TempDir::new().unwrap();
        let dir = utf8_root(&temp);
        let mut backend = NotifyBackend::new().unwrap();
        backend.watch(&dir).unwrap();

        fs::write(dir.join("100.dat"), b"x").unwrap();

        // Delivery is asynchronous; give the platform a bounded window.
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = Vec::new();
        while Instant::now() < deadline && seen.is_empty() {
            seen.extend(backend.drain_created(&dir));
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(
            seen.iter().any(|name| name == "100.dat"),
            "no create event within the deadline: {seen:?}"
        );
        assert!(!backend.take_rescan());
        backend.unwatch(&dir);
    }
}
