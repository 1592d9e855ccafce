//! Descent from a source root to its newest completed snapshot.
//!
//! A source hierarchy is exactly five levels deep:
//!
//! ```text
//! <root>/<year>/<month>/<day>/<hour>/<leaf>
//! ```
//!
//! [`HierarchyWalker`] lists one level at a time and follows the maximum name
//! under [`NameOrdering`]. It never looks at siblings of the chosen branch.
//! If the newest hour holds only temporary snapshots, the source has no
//! result for now, even when an older hour holds completed ones.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use crate::error::DiscoveryError;
use crate::ordering::{NameKind, NameOrdering};

/// Number of directory levels between a root and its leaves.
pub const DIRECTORY_LEVELS: usize = 4;

/// Walks source hierarchies to their newest completed snapshot.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use snapfeed_discovery::HierarchyWalker;
///
/// let walker = HierarchyWalker::default();
/// assert!(walker.walk(Utf8Path::new("/definitely/not/here")).is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct HierarchyWalker {
    ordering: NameOrdering,
}

impl HierarchyWalker {
    /// Creates a walker with the given naming rules.
    #[must_use]
    pub fn new(ordering: NameOrdering) -> Self {
        Self { ordering }
    }

    /// Returns the naming rules in use.
    #[inline]
    #[must_use]
    pub fn ordering(&self) -> &NameOrdering {
        &self.ordering
    }

    /// Returns the newest completed snapshot under `root`, if any.
    ///
    /// Listing failures are logged and reported as no result.
    #[must_use]
    pub fn walk(&self, root: &Utf8Path) -> Option<Utf8PathBuf> {
        match self.try_walk(root) {
            Ok(leaf) => leaf,
            Err(err) => {
                warn!(root = %root, error = %err, "Failed to walk snapshot hierarchy");
                None
            }
        }
    }

    /// Returns the newest completed snapshot under `root`, if any.
    ///
    /// A missing root and an empty level both yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Listing`] if a directory on the chosen
    /// branch exists but cannot be listed.
    pub fn try_walk(&self, root: &Utf8Path) -> Result<Option<Utf8PathBuf>, DiscoveryError> {
        let mut current = root.to_owned();
        for _ in 0..DIRECTORY_LEVELS {
            match self.newest_child(&current, NameKind::Directory)? {
                Some(child) => current = child,
                None => {
                    debug!(dir = %current, "No usable entry at this level");
                    return Ok(None);
                }
            }
        }
        self.newest_child(&current, NameKind::Leaf)
    }

    /// Returns the maximum entry of `dir` under `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Listing`] if `dir` exists but cannot be listed.
    pub fn newest_child(
        &self,
        dir: &Utf8Path,
        kind: NameKind,
    ) -> Result<Option<Utf8PathBuf>, DiscoveryError> {
        let names = list_entry_names(dir)?;
        Ok(self
            .ordering
            .select_newest(kind, &names)
            .map(|index| dir.join(&names[index])))
    }
}

/// Lists the entry names of `dir`.
///
/// A directory that does not exist lists as empty; that is the normal state
/// of a source that has not produced anything yet, or of a branch that was
/// removed between two listings. Non-UTF-8 names are logged and skipped.
///
/// # Errors
///
/// Returns [`DiscoveryError::Listing`] for any other I/O failure.
pub fn list_entry_names(dir: &Utf8Path) -> Result<Vec<String>, DiscoveryError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(DiscoveryError::listing(dir, err)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| DiscoveryError::listing(dir, err))?;
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => {
                let err = DiscoveryError::NonUtf8Path(dir.as_std_path().join(raw));
                warn!(error = %err, "Skipping entry");
            }
        }
    }
    Ok(names)
}
