//! Ordering of sibling names in a snapshot hierarchy.
//!
//! Every level of a source hierarchy is ordered numerically:
//!
//! ```text
//! root/2024/01/02/03/1704164400123.smile
//!      ^^^^ ^^ ^^ ^^ ^^^^^^^^^^^^^
//!      directory levels: pure digits     leaf: integer prefix before the first dot
//! ```
//!
//! Leaves ending in the temporary suffix (`.tmp` by default) are snapshots
//! still being written and never take part in the comparison.
//!
//! # Examples
//!
//! ```
//! use snapfeed_discovery::pick_maximum;
//!
//! let names = ["10.dat", "9.dat.tmp", "11.dat"];
//! assert_eq!(pick_maximum(&names)?, Some(2));
//!
//! let years = ["2023", "2024", "2022"];
//! assert_eq!(pick_maximum(&years)?, Some(1));
//! # Ok::<(), snapfeed_discovery::MalformedName>(())
//! ```

use tracing::{trace, warn};

/// Default suffix of snapshots that are still being written.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Which naming rule applies to a list of siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    /// Year, month, day, or hour directories: pure decimal digits.
    Directory,
    /// Snapshot files: `<integer>.<ext>`, or temporary `<integer>.<ext><suffix>`.
    Leaf,
}

impl NameKind {
    /// Classifies siblings: leaf-level if any name contains a dot.
    ///
    /// # Examples
    ///
    /// ```
    /// use snapfeed_discovery::NameKind;
    ///
    /// assert_eq!(NameKind::classify(&["01", "02"]), NameKind::Directory);
    /// assert_eq!(NameKind::classify(&["1.dat", "2.dat.tmp"]), NameKind::Leaf);
    /// ```
    #[must_use]
    pub fn classify<S: AsRef<str>>(names: &[S]) -> Self {
        if names.iter().any(|name| name.as_ref().contains('.')) {
            Self::Leaf
        } else {
            Self::Directory
        }
    }
}

/// A hierarchy entry that violates the numeric naming rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed hierarchy entry '{name}': {reason}")]
pub struct MalformedName {
    /// The offending entry name.
    pub name: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

impl MalformedName {
    /// Creates a new malformed-name error.
    #[inline]
    pub fn new(name: impl Into<String>, reason: &'static str) -> Self {
        Self {
            name: name.into(),
            reason,
        }
    }
}

/// The naming rules of one deployment.
///
/// Holds the temporary suffix; everything else about the ordering is fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameOrdering {
    temp_suffix: String,
}

impl Default for NameOrdering {
    fn default() -> Self {
        Self::new(TEMP_SUFFIX)
    }
}

impl NameOrdering {
    /// Creates an ordering with the given temporary suffix.
    #[must_use]
    pub fn new(temp_suffix: impl Into<String>) -> Self {
        Self {
            temp_suffix: temp_suffix.into(),
        }
    }

    /// Returns the temporary suffix.
    #[inline]
    #[must_use]
    pub fn temp_suffix(&self) -> &str {
        &self.temp_suffix
    }

    /// Returns `true` if `name` is a snapshot still being written.
    #[inline]
    #[must_use]
    pub fn is_temporary(&self, name: &str) -> bool {
        name.ends_with(self.temp_suffix.as_str())
    }

    /// Returns the numeric sort key of `name`.
    ///
    /// `Ok(None)` means the entry is a temporary leaf and takes no part in the
    /// comparison.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedName`] if the name (or, for leaves, the part before
    /// the first dot) is not a non-negative decimal integer.
    pub fn sort_key(&self, kind: NameKind, name: &str) -> Result<Option<u64>, MalformedName> {
        match kind {
            NameKind::Directory => parse_number(name, name).map(Some),
            NameKind::Leaf => {
                if self.is_temporary(name) {
                    trace!(name, "Ignoring temporary snapshot");
                    return Ok(None);
                }
                let prefix = name.split('.').next().unwrap_or_default();
                parse_number(name, prefix).map(Some)
            }
        }
    }

    /// Returns the index of the maximum name, classifying the list first.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedName`] for the first entry that breaks the rule.
    pub fn pick_maximum<S: AsRef<str>>(&self, names: &[S]) -> Result<Option<usize>, MalformedName> {
        self.pick_maximum_as(NameKind::classify(names), names)
    }

    /// Returns the index of the maximum name under an explicit rule.
    ///
    /// Ties cannot happen in a well-formed hierarchy; if they do, the first
    /// occurrence wins.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedName`] for the first entry that breaks the rule.
    pub fn pick_maximum_as<S: AsRef<str>>(
        &self,
        kind: NameKind,
        names: &[S],
    ) -> Result<Option<usize>, MalformedName> {
        let mut best: Option<(usize, u64)> = None;
        for (index, name) in names.iter().enumerate() {
            if let Some(key) = self.sort_key(kind, name.as_ref())? {
                if best.is_none_or(|(_, max)| key > max) {
                    best = Some((index, key));
                }
            }
        }
        Ok(best.map(|(index, _)| index))
    }

    /// Lenient variant of [`pick_maximum_as`](Self::pick_maximum_as).
    ///
    /// Malformed entries are logged and excluded instead of failing the whole
    /// selection, so one stray file does not hide the newest snapshot.
    #[must_use]
    pub fn select_newest<S: AsRef<str>>(&self, kind: NameKind, names: &[S]) -> Option<usize> {
        let mut best: Option<(usize, u64)> = None;
        for (index, name) in names.iter().enumerate() {
            match self.sort_key(kind, name.as_ref()) {
                Ok(Some(key)) => {
                    if best.is_none_or(|(_, max)| key > max) {
                        best = Some((index, key));
                    }
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "Excluding malformed hierarchy entry"),
            }
        }
        best.map(|(index, _)| index)
    }

    /// Returns `true` if `candidate` sorts strictly after `current`.
    ///
    /// Malformed or temporary candidates never win; a malformed `current`
    /// always loses to a valid candidate.
    #[must_use]
    pub fn is_newer(&self, kind: NameKind, candidate: &str, current: &str) -> bool {
        match self.sort_key(kind, candidate) {
            Ok(Some(candidate_key)) => match self.sort_key(kind, current) {
                Ok(Some(current_key)) => candidate_key > current_key,
                Ok(None) | Err(_) => true,
            },
            Ok(None) | Err(_) => false,
        }
    }
}

/// Picks the maximum of `names` with the default temporary suffix.
///
/// # Errors
///
/// Returns [`MalformedName`] if a name breaks the numeric naming rule.
pub fn pick_maximum<S: AsRef<str>>(names: &[S]) -> Result<Option<usize>, MalformedName> {
    NameOrdering::default().pick_maximum(names)
}

fn parse_number(name: &str, digits: &str) -> Result<u64, MalformedName> {
    if digits.is_empty() {
        return Err(MalformedName::new(name, "missing numeric prefix"));
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MalformedName::new(name, "not a number"));
    }
    digits
        .parse()
        .map_err(|_| MalformedName::new(name, "number out of range"))
}
