//! Extraction of "entry created" facts from raw notify events.
//!
//! Producers write a snapshot as `N.ext.tmp` and rename it to `N.ext` once it
//! is complete. Depending on the platform the rename arrives as a create, a
//! rename-to, or a combined from/to event; all of them count as the target
//! name appearing in its directory.

use camino::{Utf8Path, Utf8PathBuf};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};
use smallvec::SmallVec;
use tracing::warn;

/// An entry that appeared in a watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEntry {
    /// The directory the entry appeared in.
    pub dir: Utf8PathBuf,
    /// The entry's name within `dir`.
    pub name: String,
}

impl CreatedEntry {
    /// Splits a full path into directory and name.
    ///
    /// Returns `None` for paths without a parent or a final component.
    #[must_use]
    pub fn from_path(path: &Utf8Path) -> Option<Self> {
        Some(Self {
            dir: path.parent()?.to_owned(),
            name: path.file_name()?.to_owned(),
        })
    }
}

/// Entries created by one event. Almost always one.
pub type CreatedEntries = SmallVec<[CreatedEntry; 2]>;

/// Returns the entries an event reports as created.
///
/// Removals, content modifications, access events, and the source side of a
/// rename are ignored. Non-UTF-8 paths are logged and skipped.
#[must_use]
pub fn created_entries(event: &Event) -> CreatedEntries {
    let paths: &[std::path::PathBuf] = match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            &event.paths
        }
        // Both carries [from, to].
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.get(1..).unwrap_or_default()
        }
        // Backends that cannot tell the two sides apart: keep what still exists.
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => {
            return event
                .paths
                .iter()
                .filter(|path| path.exists())
                .filter_map(|path| to_entry(path))
                .collect();
        }
        _ => return CreatedEntries::new(),
    };
    paths.iter().filter_map(|path| to_entry(path)).collect()
}

fn to_entry(path: &std::path::Path) -> Option<CreatedEntry> {
    match Utf8Path::from_path(path) {
        Some(path) => CreatedEntry::from_path(path),
        None => {
            warn!(path = %path.display(), "Skipping non-UTF-8 path in watch event");
            None
        }
    }
}
