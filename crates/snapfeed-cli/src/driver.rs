//! Periodic discovery loops.
//!
//! Each strategy runs on its own timer. A cycle is blocking filesystem work,
//! so the discovery state moves into `spawn_blocking` for the cycle and comes
//! back with the report.

use std::sync::Arc;
use std::time::Duration;

use snapfeed_core::{Publisher, Source, SourceRegistry};
use snapfeed_discovery::{CycleReport, PollingDiscovery};
use snapfeed_fanout::{Connection, FanoutEngine};
use snapfeed_watcher::WatchingDiscovery;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A discovery strategy the driver can run on a timer.
pub trait CycleRunner: Send + 'static {
    /// Strategy label used in logs.
    const STRATEGY: &'static str;

    /// Runs one discovery cycle over `sources`.
    fn run_cycle(&mut self, sources: &[Source], publisher: &dyn Publisher) -> CycleReport;
}

impl CycleRunner for PollingDiscovery {
    const STRATEGY: &'static str = "polling";

    fn run_cycle(&mut self, sources: &[Source], publisher: &dyn Publisher) -> CycleReport {
        PollingDiscovery::run_cycle(self, sources, publisher)
    }
}

impl CycleRunner for WatchingDiscovery {
    const STRATEGY: &'static str = "watching";

    fn run_cycle(&mut self, sources: &[Source], publisher: &dyn Publisher) -> CycleReport {
        WatchingDiscovery::run_cycle(self, sources, publisher)
    }
}

/// Runs `discovery` every `interval` until `cancel` fires.
///
/// Every cycle reads the tracked sources fresh from `registry`, publishes into
/// `engine`, and then prunes the engine's cached payloads of sources that are
/// no longer tracked.
/// A panicking cycle stops this loop; the other strategy keeps running.
pub async fn run_discovery_loop<D, C>(
    mut discovery: D,
    interval: Duration,
    registry: Arc<dyn SourceRegistry>,
    engine: FanoutEngine<C>,
    cancel: CancellationToken,
) where
    D: CycleRunner,
    C: Connection,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        strategy = D::STRATEGY,
        interval_ms = interval.as_millis(),
        "Discovery loop started"
    );

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let registry = Arc::clone(&registry);
        let publisher = engine.clone();
        let cycle = tokio::task::spawn_blocking(move || {
            let sources = registry.tracked_sources();
            let report = discovery.run_cycle(&sources, &publisher);
            let pruned = publisher.retain_sources(&sources);
            (discovery, report, pruned)
        });

        match cycle.await {
            Ok((returned, report, pruned)) => {
                discovery = returned;
                if pruned > 0 {
                    debug!(
                        strategy = D::STRATEGY,
                        sources = pruned,
                        "Pruned cached payloads of untracked sources"
                    );
                }
                if report.failed > 0 {
                    debug!(
                        strategy = D::STRATEGY,
                        failed = report.failed,
                        "Cycle finished with failures"
                    );
                }
            }
            Err(join_error) => {
                error!(
                    strategy = D::STRATEGY,
                    error = %join_error,
                    "Discovery cycle aborted, stopping loop"
                );
                return;
            }
        }
    }

    info!(strategy = D::STRATEGY, "Discovery loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::{Utf8Path, Utf8PathBuf};
    use snapfeed_core::{FanoutConfig, InMemorySources, WatchBackendKind};
    use snapfeed_discovery::NameOrdering;
    use snapfeed_fanout::ChannelConnection;
    use std::fs;
    use tempfile::TempDir;

    fn write_snapshot(root: &Utf8Path, rel_dir: &str, name: &str, body: &[u8]) {
        let dir = root.join(rel_dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), body).unwrap();
    }

    #[tokio::test]
    async fn test_loop_delivers_and_stops_on_cancel() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        write_snapshot(&root, "2024/01/02/03", "100.dat", b"P1");

        let sources = Arc::new(InMemorySources::new());
        sources.upsert("daq", root.clone());
        let registry: Arc<dyn SourceRegistry> = sources;

        let engine = FanoutEngine::new(FanoutConfig::default());
        engine.start();
        engine.attach_registry(Arc::clone(&registry));
        let (connection, mut rx) = ChannelConnection::new(4);
        engine.open("daq", connection).unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_discovery_loop(
            PollingDiscovery::new(NameOrdering::default()),
            Duration::from_millis(10),
            registry,
            engine.clone(),
            cancel.clone(),
        ));

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.as_bytes(), b"P1");

        write_snapshot(&root, "2024/01/02/04", "50.dat", b"P2");
        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.as_bytes(), b"P2");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_removed_source_stops_updates() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        write_snapshot(&root, "2024/01/02/03", "100.dat", b"P1");

        let sources = Arc::new(InMemorySources::new());
        sources.upsert("daq", root.clone());
        let registry: Arc<dyn SourceRegistry> = Arc::clone(&sources) as Arc<dyn SourceRegistry>;

        let engine = FanoutEngine::new(FanoutConfig::default());
        engine.start();
        engine.attach_registry(Arc::clone(&registry));
        let (connection, mut rx) = ChannelConnection::new(4);
        engine.open("daq", connection).unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_discovery_loop(
            PollingDiscovery::new(NameOrdering::default()),
            Duration::from_millis(10),
            registry,
            engine.clone(),
            cancel.clone(),
        ));

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.as_bytes(), b"P1");

        sources.remove("daq");
        // Let at least one cycle observe the removal.
        tokio::time::sleep(Duration::from_millis(100)).await;
        write_snapshot(&root, "2024/01/02/04", "50.dat", b"P2");
        assert!(
            tokio::time::timeout(Duration::from_millis(200), rx.recv())
                .await
                .is_err()
        );

        cancel.cancel();
        task.await.unwrap();
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_both_strategies_deliver_each_leaf_once() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        write_snapshot(&root, "2024/01/02/03", "100.dat", b"P1");
        let sources = vec![Source::new("daq".into(), root.clone())];

        let engine = FanoutEngine::new(FanoutConfig::default());
        engine.start();
        engine.attach_registry(Arc::new(InMemorySources::from_sources(sources.clone())));
        let (connection, mut rx) = ChannelConnection::new(8);
        engine.open("daq", connection).unwrap();

        let mut polling = PollingDiscovery::new(NameOrdering::default());
        let mut watching = WatchingDiscovery::new(NameOrdering::default(), WatchBackendKind::Listing);

        polling.run_cycle(&sources, &engine);
        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.as_bytes(), b"P1");

        watching.run_cycle(&sources, &engine);
        write_snapshot(&root, "2024/01/02/03", "200.dat", b"P2");
        watching.run_cycle(&sources, &engine);
        polling.run_cycle(&sources, &engine);

        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.as_bytes(), b"P2");
        assert!(
            tokio::time::timeout(Duration::from_millis(200), rx.recv())
                .await
                .is_err()
        );
        assert_eq!(engine.delivered_count(), 2);
        engine.shutdown().await;
    }
}
