//! Discovery driven by directory watches.
//!
//! [`WatchingDiscovery`] keeps one [`WatchChain`] per tracked source and polls
//! them once per cycle. Chains follow the source set handed in by the driver:
//!
//! - an unseen source gets a fresh chain that cold-starts on its first poll
//! - a source whose root changed loses its chain; a new one cold-starts on
//!   the next cycle
//! - a source that is no longer tracked loses its chain immediately

use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Instant;

use camino::Utf8Path;
use snapfeed_core::{FxHashMap, FxHashSet, Publisher, Source, SourceName, WatchBackendKind, fx_hash_map};
use snapfeed_discovery::{CycleReport, DiscoveryStats, FsPayloadReader, NameOrdering, PayloadReader};
use tracing::{debug, info, warn};

use crate::backend::{WatchBackend, create_backend};
use crate::chain::{ChainOutcome, WatchChain};
use crate::error::WatchError;

/// Creates the backend for a new chain.
pub type BackendFactory = Box<dyn Fn() -> Result<Box<dyn WatchBackend>, WatchError> + Send>;

/// Event-driven discovery over a set of sources.
///
/// # Examples
///
/// ```
/// use snapfeed_core::{Payload, Publisher, SourceName, WatchBackendKind};
/// use snapfeed_discovery::NameOrdering;
/// use snapfeed_watcher::WatchingDiscovery;
///
/// struct Discard;
///
/// impl Publisher for Discard {
///     fn publish(&self, _source: &SourceName, _payload: Payload) {}
/// }
///
/// let mut discovery = WatchingDiscovery::new(NameOrdering::default(), WatchBackendKind::Listing);
/// let report = discovery.run_cycle(&[], &Discard);
/// assert_eq!(report.sources, 0);
/// assert_eq!(discovery.chain_count(), 0);
/// ```
pub struct WatchingDiscovery<R = FsPayloadReader> {
    ordering: NameOrdering,
    reader: R,
    new_backend: BackendFactory,
    chains: FxHashMap<SourceName, WatchChain>,
    stats: Arc<DiscoveryStats>,
}

impl WatchingDiscovery<FsPayloadReader> {
    /// Creates watching discovery with backends of the given kind.
    #[must_use]
    pub fn new(ordering: NameOrdering, backend: WatchBackendKind) -> Self {
        Self::with_parts(ordering, FsPayloadReader, Box::new(move || create_backend(backend)))
    }
}

impl<R: PayloadReader> WatchingDiscovery<R> {
    /// Creates watching discovery with a custom reader and backend factory.
    #[must_use]
    pub fn with_parts(ordering: NameOrdering, reader: R, new_backend: BackendFactory) -> Self {
        Self {
            ordering,
            reader,
            new_backend,
            chains: fx_hash_map(),
            stats: Arc::new(DiscoveryStats::new()),
        }
    }

    /// Returns the cumulative statistics handle.
    #[must_use]
    pub fn stats(&self) -> Arc<DiscoveryStats> {
        Arc::clone(&self.stats)
    }

    /// Returns the number of live chains.
    #[must_use]
    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    /// Returns the chain of `source`, if one exists.
    #[must_use]
    pub fn chain(&self, source: &str) -> Option<&WatchChain> {
        self.chains.get(source)
    }

    /// Returns the last leaf published for `source`.
    #[must_use]
    pub fn last_emitted(&self, source: &str) -> Option<&Utf8Path> {
        self.chains.get(source).and_then(WatchChain::last_emitted)
    }

    /// Runs one watching cycle over `sources`.
    pub fn run_cycle(&mut self, sources: &[Source], publisher: &dyn Publisher) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::new(sources.len());
        report.evicted = self.drop_untracked(sources);

        for source in sources {
            if let Some(chain) = self.chains.get(&source.name) {
                if chain.root() != source.root.as_path() {
                    info!(
                        source = %source.name,
                        old_root = %chain.root(),
                        new_root = %source.root,
                        "Source root changed, discarding watch chain"
                    );
                    self.chains.remove(&source.name);
                    report.empty += 1;
                    continue;
                }
            }

            let chain = match self.chains.entry(source.name.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => match (self.new_backend)() {
                    Ok(backend) => entry.insert(WatchChain::new(
                        source.root.clone(),
                        self.ordering.clone(),
                        backend,
                    )),
                    Err(error) => {
                        warn!(source = %source.name, error = %error, "Failed to create watch backend");
                        report.failed += 1;
                        continue;
                    }
                },
            };

            match chain.poll() {
                ChainOutcome::NewLeaf(leaf) => match self.reader.read(&leaf) {
                    Ok(payload) => {
                        info!(
                            source = %source.name,
                            leaf = %leaf,
                            bytes = payload.len(),
                            "New snapshot discovered by watching"
                        );
                        publisher.publish(&source.name, payload);
                        chain.mark_emitted(leaf);
                        report.published += 1;
                    }
                    Err(error) => {
                        warn!(source = %source.name, error = %error, "Snapshot read failed, retrying next cycle");
                        report.failed += 1;
                    }
                },
                ChainOutcome::Unchanged => report.unchanged += 1,
                ChainOutcome::Empty => report.empty += 1,
                ChainOutcome::Degraded => report.failed += 1,
            }
        }

        report.elapsed = started.elapsed();
        self.stats.record(&report);
        debug!(
            sources = report.sources,
            published = report.published,
            empty = report.empty,
            failed = report.failed,
            chains = self.chains.len(),
            elapsed_ms = report.elapsed.as_millis(),
            "Watching cycle complete"
        );
        report
    }

    fn drop_untracked(&mut self, sources: &[Source]) -> usize {
        let tracked: FxHashSet<&SourceName> = sources.iter().map(|source| &source.name).collect();
        let before = self.chains.len();
        self.chains.retain(|name, _| {
            let keep = tracked.contains(name);
            if !keep {
                info!(source = %name, "Source no longer tracked, cancelling watch chain");
            }
            keep
        });
        before - self.chains.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ListingBackend;
    use camino::Utf8PathBuf;
    use parking_lot::Mutex;
    use snapfeed_core::Payload;
    use snapfeed_discovery::PollingDiscovery;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

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

    fn listing_discovery() -> WatchingDiscovery {
        WatchingDiscovery::new(NameOrdering::default(), WatchBackendKind::Listing)
    }

    #[test]
    fn test_publishes_on_cold_start_and_updates() {
        let temp = TempDir::new().unwrap();
        let daq = source(&temp, "daq");
        write(&daq.root, "2024/01/02/03/100.dat", b"P1");

        let mut discovery = listing_discovery();
        let recorder = Recorder::default();
        let sources = vec![daq.clone()];

        discovery.run_cycle(&sources, &recorder);
        assert_eq!(recorder.take(), vec![("daq".to_owned(), b"P1".to_vec())]);

        let report = discovery.run_cycle(&sources, &recorder);
        assert_eq!(report.unchanged, 1);
        assert!(recorder.take().is_empty());

        write(&daq.root, "2024/01/02/04/200.dat", b"P2");
        discovery.run_cycle(&sources, &recorder);
        assert_eq!(recorder.take(), vec![("daq".to_owned(), b"P2".to_vec())]);
    }

    #[test]
    fn test_removed_then_readded_cold_starts() {
        let temp = TempDir::new().unwrap();
        let daq = source(&temp, "daq");
        write(&daq.root, "2024/01/02/03/100.dat", b"P1");

        let mut discovery = listing_discovery();
        let recorder = Recorder::default();
        discovery.run_cycle(std::slice::from_ref(&daq), &recorder);
        recorder.take();

        let report = discovery.run_cycle(&[], &recorder);
        assert_eq!(report.evicted, 1);
        assert_eq!(discovery.chain_count(), 0);

        discovery.run_cycle(std::slice::from_ref(&daq), &recorder);
        assert_eq!(recorder.take(), vec![("daq".to_owned(), b"P1".to_vec())]);
        assert_eq!(discovery.chain("daq").map(WatchChain::depth), Some(5));
    }

    #[test]
    fn test_root_change_discards_then_cold_starts() {
        let temp = TempDir::new().unwrap();
        let old = source(&temp, "old-root");
        let new = source(&temp, "new-root");
        write(&old.root, "2024/01/02/03/100.dat", b"OLD");
        write(&new.root, "2024/01/02/03/100.dat", b"NEW");

        let name = SourceName::new("daq");
        let mut discovery = listing_discovery();
        let recorder = Recorder::default();

        discovery.run_cycle(&[Source::new(name.clone(), old.root.clone())], &recorder);
        assert_eq!(recorder.take().len(), 1);

        let moved = [Source::new(name, new.root.clone())];
        discovery.run_cycle(&moved, &recorder);
        assert!(recorder.take().is_empty());
        assert_eq!(discovery.chain_count(), 0);

        discovery.run_cycle(&moved, &recorder);
        assert_eq!(recorder.take(), vec![("daq".to_owned(), b"NEW".to_vec())]);
    }

    #[test]
    fn test_backend_failure_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let factory: BackendFactory = Box::new(move || {
            if counter.fetch_add(1, Ordering::Relaxed) == 0 {
                Err(WatchError::from(notify::Error::generic("no inotify instances left")))
            } else {
                Ok(Box::new(ListingBackend::new()) as Box<dyn WatchBackend>)
            }
        });

        let temp = TempDir::new().unwrap();
        let daq = source(&temp, "daq");
        write(&daq.root, "2024/01/02/03/100.dat", b"P1");

        let mut discovery = WatchingDiscovery::with_parts(NameOrdering::default(), FsPayloadReader, factory);
        let recorder = Recorder::default();
        let sources = vec![daq];

        let report = discovery.run_cycle(&sources, &recorder);
        assert_eq!(report.failed, 1);
        assert_eq!(discovery.chain_count(), 0);

        let report = discovery.run_cycle(&sources, &recorder);
        assert_eq!(report.published, 1);
        assert_eq!(attempts.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_converges_with_polling() {
        let temp = TempDir::new().unwrap();
        let a = source(&temp, "a");
        let b = source(&temp, "b");
        let c = source(&temp, "c");
        let sources = vec![a.clone(), b.clone(), c.clone()];

        let mut watching = listing_discovery();
        let mut polling = PollingDiscovery::default();
        let recorder = Recorder::default();

        let steps: &[&dyn Fn()] = &[
            &|| write(&a.root, "2024/01/02/03/100.dat", b"a1"),
            &|| write(&b.root, "2024/01/02/03/100.dat.tmp", b"b0"),
            &|| {
                write(&a.root, "2024/01/02/04/150.dat", b"a2");
                write(&b.root, "2024/01/02/03/90.dat", b"b1");
            },
            &|| fs::create_dir_all(c.root.join("2024/02")).unwrap(),
            &|| write(&c.root, "2024/02/01/00/10.dat", b"c1"),
            &|| write(&a.root, "2025/01/01/00/1.dat", b"a3"),
        ];

        for step in steps {
            step();
            watching.run_cycle(&sources, &recorder);
            polling.run_cycle(&sources, &recorder);
            for source in &sources {
                let name = source.name.as_str();
                assert_eq!(watching.last_emitted(name), polling.last_known(name), "source {name}");
            }
        }
        assert_eq!(
            polling.last_known("a"),
            Some(a.root.join("2025/01/01/00/1.dat").as_path())
        );
    }

    #[test]
    fn test_native_backend_converges_with_polling() {
        use std::time::{Duration, Instant};

        let temp = TempDir::new().unwrap();
        let a = source(&temp, "a");
        let b = source(&temp, "b");
        write(&a.root, "2024/01/02/03/100.dat", b"a1");
        write(&b.root, "2024/01/02/03/90.dat", b"b1");
        let sources = vec![a.clone(), b.clone()];

        let mut watching = WatchingDiscovery::new(NameOrdering::default(), WatchBackendKind::Native);
        let mut polling = PollingDiscovery::default();
        let recorder = Recorder::default();

        let steps: &[&dyn Fn()] = &[
            &|| {},
            &|| write(&a.root, "2024/01/02/03/200.dat", b"a2"),
            &|| write(&b.root, "2024/01/02/03/100.dat.tmp", b"b2"),
            &|| {
                fs::rename(
                    b.root.join("2024/01/02/03/100.dat.tmp"),
                    b.root.join("2024/01/02/03/100.dat"),
                )
                .unwrap();
            },
            &|| write(&a.root, "2024/01/02/04/5.dat", b"a3"),
            &|| write(&b.root, "2025/01/01/00/1.dat", b"b3"),
        ];

        for (index, step) in steps.iter().enumerate() {
            step();
            polling.run_cycle(&sources, &recorder);

            // Native events arrive asynchronously; cycle until they land.
            let deadline = Instant::now() + Duration::from_secs(5);
            loop {
                watching.run_cycle(&sources, &recorder);
                let converged = sources.iter().all(|source| {
                    let name = source.name.as_str();
                    watching.last_emitted(name) == polling.last_known(name)
                });
                if converged {
                    break;
                }
                assert!(Instant::now() < deadline, "step {index} did not converge");
                std::thread::sleep(Duration::from_millis(20));
            }
        }
        assert_eq!(
            watching.last_emitted("b"),
            Some(b.root.join("2025/01/01/00/1.dat").as_path())
        );
    }
}
