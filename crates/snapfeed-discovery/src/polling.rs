//! Periodic full-walk discovery.
//!
//! Each cycle walks every tracked source from its root, compares the newest
//! leaf with the last one published for that source, and publishes on a
//! difference. Walks run in parallel on the rayon pool; comparison and
//! publishing happen on the calling thread in source order.
//!
//! # Examples
//!
//! ```
//! use parking_lot::Mutex;
//! use snapfeed_core::{Payload, Publisher, SourceName};
//! use snapfeed_discovery::PollingDiscovery;
//!
//! #[derive(Default)]
//! struct Count(Mutex<usize>);
//!
//! impl Publisher for Count {
//!     fn publish(&self, _source: &SourceName, _payload: Payload) {
//!         *self.0.lock() += 1;
//!     }
//! }
//!
//! let mut discovery = PollingDiscovery::default();
//! let count = Count::default();
//! let report = discovery.run_cycle(&[], &count);
//! assert_eq!(report.sources, 0);
//! assert_eq!(*count.0.lock(), 0);
//! ```

use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use snapfeed_core::{FxHashMap, FxHashSet, Publisher, Source, SourceName, fx_hash_map};
use tracing::{debug, info, warn};

use crate::ordering::NameOrdering;
use crate::payload::{FsPayloadReader, PayloadReader};
use crate::stats::{CycleReport, DiscoveryStats};
use crate::walker::HierarchyWalker;

/// Discovery by periodic full walks.
///
/// Holds the last published leaf per source. Entries are written only after
/// the payload was read and handed to the publisher, so a failed read is
/// retried on the next cycle.
pub struct PollingDiscovery<R = FsPayloadReader> {
    walker: HierarchyWalker,
    reader: R,
    last_known: FxHashMap<SourceName, Utf8PathBuf>,
    stats: Arc<DiscoveryStats>,
}

impl Default for PollingDiscovery<FsPayloadReader> {
    fn default() -> Self {
        Self::new(NameOrdering::default())
    }
}

impl PollingDiscovery<FsPayloadReader> {
    /// Creates polling discovery reading snapshots from the filesystem.
    #[must_use]
    pub fn new(ordering: NameOrdering) -> Self {
        Self::with_reader(ordering, FsPayloadReader)
    }
}

impl<R: PayloadReader> PollingDiscovery<R> {
    /// Creates polling discovery with a custom payload reader.
    #[must_use]
    pub fn with_reader(ordering: NameOrdering, reader: R) -> Self {
        Self {
            walker: HierarchyWalker::new(ordering),
            reader,
            last_known: fx_hash_map(),
            stats: Arc::new(DiscoveryStats::new()),
        }
    }

    /// Returns the cumulative statistics handle.
    #[must_use]
    pub fn stats(&self) -> Arc<DiscoveryStats> {
        Arc::clone(&self.stats)
    }

    /// Returns the last leaf published for `source`.
    #[must_use]
    pub fn last_known(&self, source: &str) -> Option<&Utf8Path> {
        self.last_known.get(source).map(Utf8PathBuf::as_path)
    }

    /// Returns the number of sources with a known leaf.
    #[must_use]
    pub fn known_count(&self) -> usize {
        self.last_known.len()
    }

    /// Runs one polling cycle over `sources`.
    ///
    /// Sources missing from `sources` lose their last-known leaf, so a source
    /// that is removed and later re-added publishes its current newest
    /// snapshot again.
    pub fn run_cycle(&mut self, sources: &[Source], publisher: &dyn Publisher) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::new(sources.len());

        let walker = &self.walker;
        let outcomes: Vec<_> = sources
            .par_iter()
            .map(|source| walker.try_walk(&source.root))
            .collect();

        for (source, outcome) in sources.iter().zip(outcomes) {
            let leaf = match outcome {
                Ok(Some(leaf)) => leaf,
                Ok(None) => {
                    report.empty += 1;
                    continue;
                }
                Err(err) => {
                    warn!(source = %source.name, error = %err, "Polling walk failed");
                    report.failed += 1;
                    continue;
                }
            };

            if self.last_known.get(&source.name) == Some(&leaf) {
                report.unchanged += 1;
                continue;
            }

            match self.reader.read(&leaf) {
                Ok(payload) => {
                    info!(
                        source = %source.name,
                        leaf = %leaf,
                        bytes = payload.len(),
                        "New snapshot discovered by polling"
                    );
                    publisher.publish(&source.name, payload);
                    self.last_known.insert(source.name.clone(), leaf);
                    report.published += 1;
                }
                Err(err) => {
                    warn!(source = %source.name, error = %err, "Snapshot read failed, retrying next cycle");
                    report.failed += 1;
                }
            }
        }

        report.evicted = self.evict_untracked(sources);
        report.elapsed = started.elapsed();
        self.stats.record(&report);
        debug!(
            sources = report.sources,
            published = report.published,
            empty = report.empty,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis(),
            "Polling cycle complete"
        );
        report
    }

    fn evict_untracked(&mut self, sources: &[Source]) -> usize {
        let tracked: FxHashSet<&SourceName> = sources.iter().map(|source| &source.name).collect();
        let before = self.last_known.len();
        self.last_known.retain(|name, _| {
            let keep = tracked.contains(name);
            if !keep {
                debug!(source = %name, "Forgetting untracked source");
            }
            keep
        });
        before - self.last_known.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use snapfeed_core::Payload;
    use std::fs;
    use tempfile::TempDir;

    use crate::error::DiscoveryError;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, Vec<u8>)>>);

    impl Publisher for Recorder {
        fn publish(&self, source: &SourceName, payload: Payload) {
            self.0
                .lock()
                .push((source.as_str().to_owned(), payload.as_bytes().to_vec()));
        }
    }

    impl Recorder {
        fn take(&self) -> Vec<(String, Vec<u8>)> {
            std::mem::take(&mut *self.0.lock())
        }
    }

    fn write(root: &Utf8Path, rel: &str, body: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn source(temp: &TempDir, name: &str) -> Source {
        let root = Utf8PathBuf::try_from(temp.path().join(name)).unwrap();
        Source::new(SourceName::new(name), root)
    }

    #[test]
    fn test_publishes_once_per_new_leaf() {
        let temp = TempDir::new().unwrap();
        let daq = source(&temp, "daq");
        write(&daq.root, "2024/01/02/03/100.dat", b"P1");

        let mut discovery = PollingDiscovery::default();
        let recorder = Recorder::default();
        let sources = vec![daq.clone()];

        let report = discovery.run_cycle(&sources, &recorder);
        assert_eq!(report.published, 1);
        assert_eq!(recorder.take(), vec![("daq".to_owned(), b"P1".to_vec())]);

        let report = discovery.run_cycle(&sources, &recorder);
        assert_eq!(report.unchanged, 1);
        assert!(recorder.take().is_empty());

        write(&daq.root, "2024/01/02/03/200.dat", b"P2");
        discovery.run_cycle(&sources, &recorder);
        assert_eq!(recorder.take(), vec![("daq".to_owned(), b"P2".to_vec())]);
    }

    #[test]
    fn test_temporary_leaf_is_not_published() {
        let temp = TempDir::new().unwrap();
        let daq = source(&temp, "daq");
        write(&daq.root, "2024/01/02/03/100.dat", b"P1");

        let mut discovery = PollingDiscovery::default();
        let recorder = Recorder::default();
        let sources = vec![daq.clone()];
        discovery.run_cycle(&sources, &recorder);
        recorder.take();

        write(&daq.root, "2024/01/02/03/200.dat.tmp", b"partial");
        discovery.run_cycle(&sources, &recorder);
        assert!(recorder.take().is_empty());

        fs::rename(
            daq.root.join("2024/01/02/03/200.dat.tmp"),
            daq.root.join("2024/01/02/03/200.dat"),
        )
        .unwrap();
        discovery.run_cycle(&sources, &recorder);
        assert_eq!(recorder.take(), vec![("daq".to_owned(), b"partial".to_vec())]);
    }

    #[test]
    fn test_missing_root_publishes_nothing() {
        let temp = TempDir::new().unwrap();
        let mut discovery = PollingDiscovery::default();
        let recorder = Recorder::default();

        let report = discovery.run_cycle(&[source(&temp, "ghost")], &recorder);
        assert_eq!(report.empty, 1);
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_removed_then_readded_publishes_again() {
        let temp = TempDir::new().unwrap();
        let daq = source(&temp, "daq");
        write(&daq.root, "2024/01/02/03/100.dat", b"P1");

        let mut discovery = PollingDiscovery::default();
        let recorder = Recorder::default();
        discovery.run_cycle(std::slice::from_ref(&daq), &recorder);
        recorder.take();

        let report = discovery.run_cycle(&[], &recorder);
        assert_eq!(report.evicted, 1);
        assert_eq!(discovery.known_count(), 0);

        discovery.run_cycle(std::slice::from_ref(&daq), &recorder);
        assert_eq!(recorder.take(), vec![("daq".to_owned(), b"P1".to_vec())]);
    }

    #[test]
    fn test_root_change_publishes_new_root_leaf() {
        let temp = TempDir::new().unwrap();
        let old = source(&temp, "old-root");
        let new = source(&temp, "new-root");
        write(&old.root, "2024/01/02/03/100.dat", b"OLD");
        write(&new.root, "2024/01/02/03/100.dat", b"NEW");

        let mut discovery = PollingDiscovery::default();
        let recorder = Recorder::default();
        let name = SourceName::new("daq");

        discovery.run_cycle(&[Source::new(name.clone(), old.root.clone())], &recorder);
        discovery.run_cycle(&[Source::new(name, new.root.clone())], &recorder);
        let published: Vec<_> = recorder.take().into_iter().map(|(_, body)| body).collect();
        assert_eq!(published, vec![b"OLD".to_vec(), b"NEW".to_vec()]);
    }

    struct FlakyReader {
        failures_left: Mutex<usize>,
    }

    impl PayloadReader for FlakyReader {
        fn read(&self, path: &Utf8Path) -> Result<Payload, DiscoveryError> {
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                return Err(DiscoveryError::payload_read(
                    path,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "vanished"),
                ));
            }
            FsPayloadReader.read(path)
        }
    }

    #[test]
    fn test_failed_read_is_retried() {
        let temp = TempDir::new().unwrap();
        let daq = source(&temp, "daq");
        write(&daq.root, "2024/01/02/03/100.dat", b"P1");

        let reader = FlakyReader {
            failures_left: Mutex::new(1),
        };
        let mut discovery = PollingDiscovery::with_reader(NameOrdering::default(), reader);
        let recorder = Recorder::default();
        let sources = vec![daq];

        let report = discovery.run_cycle(&sources, &recorder);
        assert_eq!(report.failed, 1);
        assert!(recorder.take().is_empty());

        let report = discovery.run_cycle(&sources, &recorder);
        assert_eq!(report.published, 1);
        assert_eq!(recorder.take().len(), 1);
    }

    #[test]
    fn test_independent_sources() {
        let temp = TempDir::new().unwrap();
        let a = source(&temp, "a");
        let b = source(&temp, "b");
        write(&a.root, "2024/01/02/03/100.dat", b"A1");

        let mut discovery = PollingDiscovery::default();
        let recorder = Recorder::default();
        let report = discovery.run_cycle(&[a, b], &recorder);
        assert_eq!(report.published, 1);
        assert_eq!(report.empty, 1);
        assert_eq!(discovery.stats().snapshot().published, 1);
    }
}
