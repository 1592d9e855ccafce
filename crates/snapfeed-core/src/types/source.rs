//! Source identity types.
//!
//! A source is one producer writing snapshots into its own
//! `root/year/month/day/hour/leaf` hierarchy.

use std::borrow::Borrow;
use std::fmt;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// The stable name of a source.
///
/// Names are the keys subscribers use to pick a feed, so they are compared
/// exactly. Use [`SourceName::new`] to build one; [`Borrow<str>`] lets maps
/// keyed by `SourceName` be queried with a plain `&str`.
///
/// # Examples
///
/// ```
/// use snapfeed_core::SourceName;
///
/// let name = SourceName::new("daq-main");
/// assert_eq!(name.as_str(), "daq-main");
/// assert_eq!(name.to_string(), "daq-main");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceName(String);

impl SourceName {
    /// Creates a source name.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SourceName {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceName {
    #[inline]
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for SourceName {
    #[inline]
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A tracked source: its name and the root of its hierarchy.
///
/// The root may change over the lifetime of a name (the source was
/// redefined); discovery strategies compare roots between cycles to notice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    /// The source name.
    pub name: SourceName,
    /// Root of the `year/month/day/hour/leaf` hierarchy.
    pub root: Utf8PathBuf,
}

impl Source {
    /// Creates a new source.
    ///
    /// # Examples
    ///
    /// ```
    /// use snapfeed_core::{Source, SourceName};
    ///
    /// let source = Source::new(SourceName::new("daq"), "/data/daq".into());
    /// assert_eq!(source.root.as_str(), "/data/daq");
    /// ```
    #[inline]
    #[must_use]
    pub fn new(name: SourceName, root: Utf8PathBuf) -> Self {
        Self { name, root }
    }
}
