//! The per-source chain of directory watches.
//!
//! A chain holds one watch per level on the newest branch of a source:
//!
//! ```text
//! level 0   <root>                      children: years
//! level 1   <root>/2024                 children: months
//! level 2   <root>/2024/01              children: days
//! level 3   <root>/2024/01/02           children: hours
//! level 4   <root>/2024/01/02/03        children: snapshot leaves
//! ```
//!
//! Every poll drains the levels from the shallowest down. The first level
//! where a created entry beats the current child invalidates every deeper
//! watch, registers the new child and resumes the descent from there. A
//! level that has nothing usable yet leaves the chain partial; partial chains
//! resume on the next poll.

use camino::{Utf8Path, Utf8PathBuf};
use snapfeed_discovery::{DIRECTORY_LEVELS, NameKind, NameOrdering, list_entry_names};
use tracing::{debug, warn};

use crate::backend::WatchBackend;
use crate::error::WatchError;

/// Number of watched levels, root included.
pub const CHAIN_DEPTH: usize = DIRECTORY_LEVELS + 1;

const LEAF_LEVEL: usize = DIRECTORY_LEVELS;

const fn kind_at(level: usize) -> NameKind {
    if level == LEAF_LEVEL {
        NameKind::Leaf
    } else {
        NameKind::Directory
    }
}

/// The result of polling a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// The newest leaf has not been emitted yet.
    NewLeaf(Utf8PathBuf),
    /// The newest leaf was already emitted.
    Unchanged,
    /// The source has no completed snapshot on its newest branch.
    Empty,
    /// A watch could not be registered or a level could not be listed; the
    /// chain was truncated there and resumes on the next poll.
    Degraded,
}

/// Watches on the newest branch of one source.
pub struct WatchChain {
    root: Utf8PathBuf,
    ordering: NameOrdering,
    backend: Box<dyn WatchBackend>,
    links: [Option<Utf8PathBuf>; CHAIN_DEPTH],
    leaf: Option<Utf8PathBuf>,
    last_emitted: Option<Utf8PathBuf>,
}

impl std::fmt::Debug for WatchChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchChain")
            .field("root", &self.root)
            .field("depth", &self.depth())
            .field("leaf", &self.leaf)
            .field("last_emitted", &self.last_emitted)
            .finish_non_exhaustive()
    }
}

impl WatchChain {
    /// Creates an empty chain. Nothing is watched until the first poll.
    #[must_use]
    pub fn new(root: Utf8PathBuf, ordering: NameOrdering, backend: Box<dyn WatchBackend>) -> Self {
        Self {
            root,
            ordering,
            backend,
            links: Default::default(),
            leaf: None,
            last_emitted: None,
        }
    }

    /// Returns the source root this chain watches.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the number of levels currently watched.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.links.iter().take_while(|link| link.is_some()).count()
    }

    /// Returns the watched directory at `level`, if established.
    #[must_use]
    pub fn link(&self, level: usize) -> Option<&Utf8Path> {
        self.links.get(level)?.as_deref()
    }

    /// Returns the newest leaf on the watched branch.
    #[must_use]
    pub fn current_leaf(&self) -> Option<&Utf8Path> {
        self.leaf.as_deref()
    }

    /// Returns the last leaf handed to the publisher.
    #[must_use]
    pub fn last_emitted(&self) -> Option<&Utf8Path> {
        self.last_emitted.as_deref()
    }

    /// Records that `leaf` was read and published.
    pub fn mark_emitted(&mut self, leaf: Utf8PathBuf) {
        self.last_emitted = Some(leaf);
    }

    /// Brings the chain up to date and reports the newest leaf.
    ///
    /// If the backend lost events, every watch is dropped and the chain
    /// cold-starts instead of trusting its drained names.
    pub fn poll(&mut self) -> ChainOutcome {
        if self.backend.take_rescan() && self.links[0].is_some() {
            warn!(root = %self.root, depth = self.depth(), "Watch events lost, rebuilding chain");
            self.cancel();
        }

        let result = if self.links[0].is_none() {
            self.cold_start()
        } else {
            self.advance()
        };

        if let Err(error) = result {
            if error.is_fatal() {
                self.cancel();
            }
            warn!(
                root = %self.root,
                depth = self.depth(),
                error = %error,
                "Watch chain truncated, resuming next cycle"
            );
            return ChainOutcome::Degraded;
        }

        match &self.leaf {
            None => ChainOutcome::Empty,
            Some(leaf) if self.last_emitted.as_ref() == Some(leaf) => ChainOutcome::Unchanged,
            Some(leaf) => ChainOutcome::NewLeaf(leaf.clone()),
        }
    }

    /// Removes every watch. The next poll cold-starts.
    pub fn cancel(&mut self) {
        for link in self.links.iter_mut().rev() {
            if let Some(dir) = link.take() {
                self.backend.unwatch(&dir);
            }
        }
        self.leaf = None;
    }

    fn cold_start(&mut self) -> Result<(), WatchError> {
        if !self.root.is_dir() {
            debug!(root = %self.root, "Source root does not exist yet");
            return Ok(());
        }
        self.backend.watch(&self.root)?;
        self.links[0] = Some(self.root.clone());
        debug!(root = %self.root, "Watch chain cold start");
        self.descend(0)
    }

    /// Drains every level, reacting to the shallowest new maximum.
    fn advance(&mut self) -> Result<(), WatchError> {
        for level in 0..CHAIN_DEPTH {
            let Some(dir) = self.links[level].clone() else {
                break;
            };
            let created = self.backend.drain_created(&dir);
            if created.is_empty() {
                continue;
            }

            let kind = kind_at(level);
            let Some(index) = self.ordering.select_newest(kind, &created) else {
                continue;
            };
            let candidate = created[index].as_str();
            let is_new_max = self
                .child_name(level)
                .is_none_or(|current| self.ordering.is_newer(kind, candidate, current));
            if !is_new_max {
                continue;
            }

            debug!(root = %self.root, level, entry = candidate, "New maximum, invalidating deeper watches");
            self.truncate_below(level);
            let child = dir.join(candidate);
            if level == LEAF_LEVEL {
                self.leaf = Some(child);
                return Ok(());
            }
            self.backend.watch(&child)?;
            self.links[level + 1] = Some(child);
            return self.descend(level + 1);
        }
        self.resume()
    }

    /// Continues the descent of a partial chain.
    fn resume(&mut self) -> Result<(), WatchError> {
        let depth = self.depth();
        if depth == 0 {
            return Ok(());
        }
        let deepest = depth - 1;
        if deepest < LEAF_LEVEL || self.leaf.is_none() {
            self.descend(deepest)
        } else {
            Ok(())
        }
    }

    /// Lists `links[from]` and follows the newest entry down, watching each
    /// directory before it is listed.
    fn descend(&mut self, from: usize) -> Result<(), WatchError> {
        let mut level = from;
        loop {
            let Some(dir) = self.links[level].clone() else {
                return Ok(());
            };
            let names = list_entry_names(&dir)?;
            let Some(index) = self.ordering.select_newest(kind_at(level), &names) else {
                return Ok(());
            };
            let child = dir.join(&names[index]);
            if level == LEAF_LEVEL {
                self.leaf = Some(child);
                return Ok(());
            }
            self.backend.watch(&child)?;
            self.links[level + 1] = Some(child);
            level += 1;
        }
    }

    fn child_name(&self, level: usize) -> Option<&str> {
        let child = if level == LEAF_LEVEL {
            self.leaf.as_ref()
        } else {
            self.links[level + 1].as_ref()
        };
        child.and_then(|path| path.file_name())
    }

    fn truncate_below(&mut self, level: usize) {
        for deeper in (level + 1..CHAIN_DEPTH).rev() {
            if let Some(dir) = self.links[deeper].take() {
                self.backend.unwatch(&dir);
            }
        }
        self.leaf = None;
    }
}

impl Drop for WatchChain {
    fn drop(&mut self) {
        self.cancel();
    }
}
