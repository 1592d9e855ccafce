//! Error types for the snapfeed-discovery crate.
//!
//! This module provides the [`DiscoveryError`] type for errors that can occur
//! while walking a snapshot hierarchy or reading a snapshot.

use camino::Utf8PathBuf;

use crate::ordering::MalformedName;

/// Errors that can occur during discovery.
///
/// None of these escape a discovery cycle: they are logged where they occur
/// and scoped to the source they belong to.
///
/// # Error Recovery Strategy
///
/// - **Malformed names** ([`DiscoveryError::MalformedName`]): exclude the entry, keep going
/// - **Listing failures** ([`DiscoveryError::Listing`]): no result for the source this cycle
/// - **Payload reads** ([`DiscoveryError::PayloadRead`]): no publish this cycle, retried next cycle
/// - **Non-UTF-8 paths** ([`DiscoveryError::NonUtf8Path`]): skip the entry
///
/// # Examples
///
/// ```
/// use snapfeed_discovery::DiscoveryError;
///
/// fn describe(err: &DiscoveryError) -> &'static str {
///     match err {
///         DiscoveryError::MalformedName(_) => "malformed",
///         DiscoveryError::Listing { .. } => "listing",
///         DiscoveryError::PayloadRead { .. } => "payload",
///         DiscoveryError::NonUtf8Path(_) => "utf8",
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// A hierarchy entry violates the numeric naming rule.
    #[error(transparent)]
    MalformedName(#[from] MalformedName),

    /// A directory could not be listed.
    #[error("failed to list directory {path}: {source}")]
    Listing {
        /// The directory that couldn't be listed.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A snapshot vanished or was unreadable between selection and read.
    #[error("failed to read snapshot {path}: {source}")]
    PayloadRead {
        /// The snapshot path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),
}

impl DiscoveryError {
    /// Creates a new [`DiscoveryError::Listing`] error.
    #[inline]
    pub fn listing(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Listing {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`DiscoveryError::PayloadRead`] error.
    #[inline]
    pub fn payload_read(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::PayloadRead {
            path: path.into(),
            source,
        }
    }

    /// Returns the path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Listing { path, .. } | Self::PayloadRead { path, .. } => Some(path),
            Self::MalformedName(_) | Self::NonUtf8Path(_) => None,
        }
    }
}
