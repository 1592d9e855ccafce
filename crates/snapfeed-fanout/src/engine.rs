//! The fan-out engine.
//!
//! Discovery publishes at most one payload per source per cycle; subscribers
//! consume at their own pace. The engine sits in between and keeps, for each
//! subscriber, only the newest payload that has not been sent yet:
//!
//! ```text
//! publish(source, P) ──► pending[id] = P for every subscriber of source
//!                        queue.push(id) only if id was not already pending
//!
//! worker ──► pop id ──► take pending[id] ──► connection.send(P)
//!                                              ├─ error/timeout ─► unsubscribe
//!                                              └─ done ─► requeue id if pending again
//! ```
//!
//! An id whose send is in flight is never handed to a second worker. A
//! payload published meanwhile waits in `pending` until the send finishes.
//!
//! Subscriptions, sessions, pending payloads, the queue, and the latest
//! payload per source live under a single lock. It is held only for lookups
//! and mutations, never across a send.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use snapfeed_core::{
    FanoutConfig, FxHashMap, FxHashSet, Payload, Publisher, Source, SourceName, SourceRegistry,
    SubscriberId, fx_hash_map, fx_hash_set,
};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::connection::Connection;
use crate::error::{DeliveryError, Rejection};

struct Session<C> {
    source: SourceName,
    connection: Arc<C>,
}

struct State<C> {
    subscriptions: FxHashMap<SourceName, FxHashSet<SubscriberId>>,
    sessions: FxHashMap<SubscriberId, Session<C>>,
    /// Presence of an entry is the pending flag.
    pending: FxHashMap<SubscriberId, Payload>,
    queue: VecDeque<SubscriberId>,
    in_flight: FxHashSet<SubscriberId>,
    latest: FxHashMap<SourceName, Payload>,
}

impl<C> State<C> {
    fn new() -> Self {
        Self {
            subscriptions: fx_hash_map(),
            sessions: fx_hash_map(),
            pending: fx_hash_map(),
            queue: VecDeque::new(),
            in_flight: fx_hash_set(),
            latest: fx_hash_map(),
        }
    }

    /// Overwrites the pending payload of `id`. Returns `true` if `id` was
    /// queued by this call.
    fn enqueue(&mut self, id: SubscriberId, payload: Payload) -> bool {
        if self.pending.insert(id, payload).is_none() {
            self.queue.push_back(id);
            true
        } else {
            false
        }
    }

    fn remove(&mut self, id: SubscriberId) -> Option<SourceName> {
        let session = self.sessions.remove(&id)?;
        self.pending.remove(&id);
        self.in_flight.remove(&id);
        if let Some(subscribers) = self.subscriptions.get_mut(&session.source) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                self.subscriptions.remove(&session.source);
            }
        }
        Some(session.source)
    }

    fn next_delivery(&mut self) -> Option<Delivery<C>> {
        while let Some(id) = self.queue.pop_front() {
            // Requeued by `finish` once the current send is done.
            if self.in_flight.contains(&id) {
                continue;
            }
            // Stale ids of removed subscribers have no pending entry.
            let Some(payload) = self.pending.remove(&id) else {
                continue;
            };
            if let Some(session) = self.sessions.get(&id) {
                self.in_flight.insert(id);
                return Some(Delivery {
                    id,
                    payload,
                    connection: Arc::clone(&session.connection),
                });
            }
        }
        None
    }

    /// Clears the in-flight mark of `id`. Returns `true` if a payload
    /// published during the send was requeued.
    fn finish(&mut self, id: SubscriberId) -> bool {
        if !self.in_flight.remove(&id) {
            return false;
        }
        if self.pending.contains_key(&id) {
            self.queue.push_back(id);
            true
        } else {
            false
        }
    }
}

struct Delivery<C> {
    id: SubscriberId,
    payload: Payload,
    connection: Arc<C>,
}

struct Inner<C> {
    config: FanoutConfig,
    state: Mutex<State<C>>,
    ready: Notify,
    registry: RwLock<Option<Arc<dyn SourceRegistry>>>,
    next_id: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<C: Connection> Inner<C> {
    fn next_delivery(&self) -> Option<Delivery<C>> {
        self.state.lock().next_delivery()
    }

    fn remove_subscriber(&self, id: SubscriberId) -> Option<SourceName> {
        self.state.lock().remove(id)
    }

    fn fail(&self, id: SubscriberId, cause: &DeliveryError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        if let Some(source) = self.remove_subscriber(id) {
            warn!(subscriber = %id, source = %source, error = %cause, "Delivery failed, subscriber dropped");
        }
    }

    async fn deliver(&self, delivery: Delivery<C>) {
        let Delivery {
            id,
            payload,
            connection,
        } = delivery;
        let timeout = self.config.send_timeout();
        let bytes = payload.len();
        match tokio::time::timeout(timeout, connection.send(payload)).await {
            Ok(Ok(())) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                trace!(subscriber = %id, bytes, "Payload delivered");
            }
            Ok(Err(error)) => self.fail(id, &error),
            Err(_elapsed) => self.fail(id, &DeliveryError::Timeout(timeout)),
        }
        if self.state.lock().finish(id) {
            self.ready.notify_one();
        }
    }
}

async fn run_worker<C: Connection>(inner: Arc<Inner<C>>, worker: usize) {
    debug!(worker, "Delivery worker started");
    loop {
        while !inner.cancel.is_cancelled() {
            let Some(delivery) = inner.next_delivery() else {
                break;
            };
            inner.deliver(delivery).await;
        }

        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            () = inner.ready.notified() => {}
        }
    }
    debug!(worker, "Delivery worker stopped");
}

/// Latest-wins fan-out of payloads to subscribers.
///
/// Cloning is cheap and shares the engine.
///
/// # Lifecycle
///
/// 1. [`new`](Self::new), then [`start`](Self::start) inside a tokio runtime
/// 2. [`attach_registry`](Self::attach_registry) once sources are known;
///    until then [`open`](Self::open) answers [`Rejection::NotReady`]
/// 3. discovery calls [`Publisher::publish`]
/// 4. [`shutdown`](Self::shutdown) stops the workers and reports what was
///    left undelivered
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use snapfeed_core::{FanoutConfig, InMemorySources, Payload, Publisher, SourceName};
/// use snapfeed_fanout::{ChannelConnection, FanoutEngine};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let engine = FanoutEngine::new(FanoutConfig::default());
/// engine.start();
///
/// let sources = InMemorySources::new();
/// sources.upsert("daq", "/data/daq".into());
/// engine.attach_registry(Arc::new(sources));
///
/// let (connection, mut rx) = ChannelConnection::new(4);
/// engine.open("daq", connection).unwrap();
/// engine.publish(&SourceName::new("daq"), Payload::from_static(b"P1"));
///
/// assert_eq!(rx.recv().await.unwrap().as_bytes(), b"P1");
/// engine.shutdown().await;
/// # }
/// ```
pub struct FanoutEngine<C: Connection> {
    inner: Arc<Inner<C>>,
}

impl<C: Connection> Clone for FanoutEngine<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connection> std::fmt::Debug for FanoutEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutEngine")
            .field("subscribers", &self.subscriber_count())
            .field("pending", &self.pending_count())
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl<C: Connection> FanoutEngine<C> {
    /// Creates an engine. No worker runs until [`start`](Self::start).
    #[must_use]
    pub fn new(config: FanoutConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::new()),
                ready: Notify::new(),
                registry: RwLock::new(None),
                next_id: AtomicU64::new(1),
                delivered: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                cancel: CancellationToken::new(),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Spawns the delivery workers on the current tokio runtime.
    ///
    /// Calling it again while workers are running does nothing.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(&self) {
        let mut workers = self.inner.workers.lock();
        if !workers.is_empty() {
            debug!("Delivery workers already running");
            return;
        }
        let count = self.inner.config.workers.max(1);
        for worker in 0..count {
            workers.push(tokio::spawn(run_worker(Arc::clone(&self.inner), worker)));
        }
        info!(workers = count, "Fan-out engine started");
    }

    /// Attaches the registry used to validate subscriptions.
    pub fn attach_registry(&self, registry: Arc<dyn SourceRegistry>) {
        *self.inner.registry.write() = Some(registry);
        debug!("Source registry attached");
    }

    /// Returns `true` once a registry is attached.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.registry.read().is_some()
    }

    /// Subscribes `connection` to `source`.
    ///
    /// On success the latest known payload of the source, if any, is queued
    /// for the new subscriber only.
    ///
    /// # Errors
    ///
    /// - [`Rejection::MissingSource`] if `source` is blank
    /// - [`Rejection::NotReady`] if no registry is attached
    /// - [`Rejection::UnknownSource`] if the registry does not track `source`
    pub fn open(&self, source: &str, connection: C) -> Result<SubscriberId, Rejection> {
        let source = source.trim();
        if source.is_empty() {
            return Err(Rejection::MissingSource);
        }
        let registry = self.inner.registry.read().clone().ok_or(Rejection::NotReady)?;
        if !registry.contains(source) {
            return Err(Rejection::UnknownSource(SourceName::new(source)));
        }

        let name = SourceName::new(source);
        let id = SubscriberId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let queued = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            state.sessions.insert(
                id,
                Session {
                    source: name.clone(),
                    connection: Arc::new(connection),
                },
            );
            state.subscriptions.entry(name.clone()).or_default().insert(id);
            match state.latest.get(&name).cloned() {
                Some(payload) => state.enqueue(id, payload),
                None => false,
            }
        };
        if queued {
            self.inner.ready.notify_one();
        }
        info!(subscriber = %id, source = %name, catch_up = queued, "Subscriber attached");
        Ok(id)
    }

    /// Unsubscribes `id`. Returns `false` if it was not subscribed.
    pub fn close(&self, id: SubscriberId) -> bool {
        match self.inner.remove_subscriber(id) {
            Some(source) => {
                info!(subscriber = %id, source = %source, "Subscriber detached");
                true
            }
            None => false,
        }
    }

    /// Unsubscribes `id` after a transport failure.
    pub fn fail(&self, id: SubscriberId, cause: &DeliveryError) {
        self.inner.fail(id, cause);
    }

    /// Drops the cached latest payload of every source not in `tracked`.
    ///
    /// Returns the number of entries dropped.
    pub fn retain_sources(&self, tracked: &[Source]) -> usize {
        let names: FxHashSet<&SourceName> = tracked.iter().map(|source| &source.name).collect();
        let mut state = self.inner.state.lock();
        let before = state.latest.len();
        state.latest.retain(|name, _| names.contains(name));
        before - state.latest.len()
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().sessions.len()
    }

    /// Returns the number of subscribers with a payload waiting.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Returns the number of successful sends.
    #[must_use]
    pub fn delivered_count(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    /// Returns the number of failed or timed-out sends.
    #[must_use]
    pub fn failed_count(&self) -> u64 {
        self.inner.failed.load(Ordering::Relaxed)
    }

    /// Stops the workers and tears down every subscription.
    ///
    /// Workers stop waiting immediately; a send in flight gets until the
    /// shutdown timeout to finish. Returns the number of payloads that were
    /// still pending.
    pub async fn shutdown(&self) -> usize {
        self.inner.cancel.cancel();
        let handles = std::mem::take(&mut *self.inner.workers.lock());
        let deadline = tokio::time::Instant::now() + self.inner.config.shutdown_timeout();

        for mut handle in handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!("Delivery worker did not stop in time, aborting");
                handle.abort();
            }
        }

        *self.inner.registry.write() = None;
        let undelivered = {
            let mut state = self.inner.state.lock();
            let undelivered = state.pending.len();
            *state = State::new();
            undelivered
        };
        if undelivered > 0 {
            warn!(undelivered, "Fan-out engine stopped with undelivered payloads");
        }
        info!(
            delivered = self.delivered_count(),
            failed = self.failed_count(),
            "Fan-out engine stopped"
        );
        undelivered
    }
}

/// A payload equal to the latest one of its source is dropped, so both
/// discovery strategies reporting the same leaf deliver it once.
impl<C: Connection> Publisher for FanoutEngine<C> {
    fn publish(&self, source: &SourceName, payload: Payload) {
        let queued = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if state.latest.get(source) == Some(&payload) {
                drop(guard);
                trace!(source = %source, "Payload already published, skipping");
                return;
            }
            state.latest.insert(source.clone(), payload.clone());
            let subscribers: SmallVec<[SubscriberId; 8]> = state
                .subscriptions
                .get(source)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default();
            let mut queued = 0;
            for id in subscribers {
                if state.enqueue(id, payload.clone()) {
                    queued += 1;
                }
            }
            queued
        };
        trace!(source = %source, queued, "Payload published");
        for _ in 0..queued {
            self.inner.ready.notify_one();
        }
    }
}
