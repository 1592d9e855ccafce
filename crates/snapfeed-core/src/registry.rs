//! Boundaries between discovery, fan-out, and the source registry.
//!
//! - [`Publisher`] is the single entry point discovery uses to hand a new
//!   snapshot to whatever delivers it.
//! - [`SourceRegistry`] is the collaborator that knows which sources exist
//!   and where their hierarchies live.
//! - [`InMemorySources`] is a registry backed by a shared table, for
//!   embedders that manage sources programmatically.

use std::sync::Arc;

use camino::Utf8PathBuf;
use parking_lot::RwLock;

use crate::hash::{FxHashMap, fx_hash_map};
use crate::types::{Payload, Source, SourceName};

/// Receives newly discovered snapshots.
///
/// Implementations must tolerate concurrent calls: both discovery strategies
/// may publish at the same time.
///
/// # Examples
///
/// ```
/// use parking_lot::Mutex;
/// use snapfeed_core::{Payload, Publisher, SourceName};
///
/// #[derive(Default)]
/// struct Recorder(Mutex<Vec<(SourceName, Payload)>>);
///
/// impl Publisher for Recorder {
///     fn publish(&self, source: &SourceName, payload: Payload) {
///         self.0.lock().push((source.clone(), payload));
///     }
/// }
///
/// let recorder = Recorder::default();
/// recorder.publish(&SourceName::new("daq"), Payload::from_static(b"P1"));
/// assert_eq!(recorder.0.lock().len(), 1);
/// ```
pub trait Publisher: Send + Sync {
    /// Publishes `payload` as the newest snapshot of `source`.
    fn publish(&self, source: &SourceName, payload: Payload);
}

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    #[inline]
    fn publish(&self, source: &SourceName, payload: Payload) {
        (**self).publish(source, payload);
    }
}

impl<P: Publisher + ?Sized> Publisher for &P {
    #[inline]
    fn publish(&self, source: &SourceName, payload: Payload) {
        (**self).publish(source, payload);
    }
}

/// The set of currently tracked sources.
///
/// Discovery asks for the full set each cycle and diffs it against its own
/// state to notice additions, removals, and root changes.
pub trait SourceRegistry: Send + Sync {
    /// Returns every tracked source.
    fn tracked_sources(&self) -> Vec<Source>;

    /// Returns `true` if a source with this name is tracked.
    fn contains(&self, name: &str) -> bool {
        self.tracked_sources()
            .iter()
            .any(|source| source.name.as_str() == name)
    }
}

impl<R: SourceRegistry + ?Sized> SourceRegistry for Arc<R> {
    #[inline]
    fn tracked_sources(&self) -> Vec<Source> {
        (**self).tracked_sources()
    }

    #[inline]
    fn contains(&self, name: &str) -> bool {
        (**self).contains(name)
    }
}

/// A source registry held in memory.
///
/// Cloning shares the table, so one clone can be handed to the fan-out
/// engine while another is mutated by whoever owns source definitions.
///
/// # Examples
///
/// ```
/// use snapfeed_core::{InMemorySources, SourceRegistry};
///
/// let sources = InMemorySources::new();
/// sources.upsert("daq", "/data/daq".into());
/// assert!(sources.contains("daq"));
///
/// sources.remove("daq");
/// assert!(sources.tracked_sources().is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemorySources {
    roots: Arc<RwLock<FxHashMap<SourceName, Utf8PathBuf>>>,
}

impl InMemorySources {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roots: Arc::new(RwLock::new(fx_hash_map())),
        }
    }

    /// Creates a registry from an initial set of sources.
    #[must_use]
    pub fn from_sources(sources: impl IntoIterator<Item = Source>) -> Self {
        let registry = Self::new();
        {
            let mut roots = registry.roots.write();
            for source in sources {
                roots.insert(source.name, source.root);
            }
        }
        registry
    }

    /// Adds a source or redefines its root.
    ///
    /// Returns `true` if the table changed.
    pub fn upsert(&self, name: impl Into<SourceName>, root: Utf8PathBuf) -> bool {
        let name = name.into();
        let mut roots = self.roots.write();
        match roots.get(&name) {
            Some(existing) if *existing == root => false,
            _ => {
                roots.insert(name, root);
                true
            }
        }
    }

    /// Removes a source. Returns `true` if it was tracked.
    pub fn remove(&self, name: &str) -> bool {
        self.roots.write().remove(name).is_some()
    }

    /// Replaces the whole table.
    pub fn replace_all(&self, sources: impl IntoIterator<Item = Source>) {
        let table = sources
            .into_iter()
            .map(|source| (source.name, source.root))
            .collect();
        *self.roots.write() = table;
    }

    /// Returns the number of tracked sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.read().len()
    }

    /// Returns `true` if no source is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.read().is_empty()
    }
}

impl SourceRegistry for InMemorySources {
    fn tracked_sources(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self
            .roots
            .read()
            .iter()
            .map(|(name, root)| Source::new(name.clone(), root.clone()))
            .collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        sources
    }

    fn contains(&self, name: &str) -> bool {
        self.roots.read().contains_key(name)
    }
}
