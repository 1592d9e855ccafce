//! Error types for the snapfeed-watcher crate.
//!
//! This module provides the [`WatchError`] type for errors that can occur
//! while registering or polling directory watches.

use camino::Utf8PathBuf;
use snapfeed_discovery::DiscoveryError;

/// Errors that can occur during watch operations.
///
/// # Error Recovery Strategy
///
/// A failure never leaves the cycle that hit it. What differs is how much of
/// the watch state survives:
///
/// - **Backend errors** ([`WatchError::Notify`]): fatal; the backend could not
///   be created and the source is retried with a fresh one next cycle. Errors
///   reported by a running backend raise its rescan flag instead, and the
///   chain rebuilds from the root on its next poll
/// - **Registration failures** ([`WatchError::Registration`]): recoverable; the
///   chain is truncated at that level and resumes on the next cycle
/// - **Path not found** ([`WatchError::PathNotFound`]): recoverable; the
///   directory vanished or does not exist yet
/// - **Listing failures** ([`WatchError::Discovery`]): recoverable
///
/// # Examples
///
/// ```
/// use snapfeed_watcher::WatchError;
///
/// let err = WatchError::path_not_found("/data/daq");
/// assert!(err.is_recoverable());
/// assert_eq!(err.path().map(|p| p.as_str()), Some("/data/daq"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The notification backend could not be created or failed outright.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// A watch on a directory could not be registered.
    #[error("failed to watch {path}: {source}")]
    Registration {
        /// The directory that could not be watched.
        path: Utf8PathBuf,
        /// The backend error.
        #[source]
        source: notify::Error,
    },

    /// The directory to watch does not exist.
    #[error("path does not exist: {0}")]
    PathNotFound(Utf8PathBuf),

    /// Listing a watched directory failed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

impl WatchError {
    /// Creates a new [`WatchError::PathNotFound`] error.
    #[inline]
    pub fn path_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Creates a new [`WatchError::Registration`] error.
    #[inline]
    pub fn registration(path: impl Into<Utf8PathBuf>, source: notify::Error) -> Self {
        Self::Registration {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if the chain that hit this error can keep its shallower
    /// levels and retry the rest on the next cycle.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Notify(_))
    }

    /// Returns `true` if the chain must be rebuilt.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the directory associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Registration { path, .. } | Self::PathNotFound(path) => Some(path),
            Self::Discovery(err) => err.path(),
            Self::Notify(_) => None,
        }
    }
}
