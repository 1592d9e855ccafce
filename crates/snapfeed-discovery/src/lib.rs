//! Newest-snapshot discovery over time-partitioned hierarchies.
//!
//! Every source writes snapshots into a fixed five-level tree:
//!
//! ```text
//! <root>/<year>/<month>/<day>/<hour>/<millis>.<ext>
//! ```
//!
//! This crate finds the newest completed snapshot of each source.
//!
//! - [`NameOrdering`]: numeric ordering of sibling names, temporary-file filter
//! - [`HierarchyWalker`]: single-branch descent from a root to its newest leaf
//! - [`PollingDiscovery`]: periodic full walks with per-source change detection
//! - [`PayloadReader`]: reads the selected snapshot
//! - [`DiscoveryStats`]: cumulative counters, [`CycleReport`] per cycle
//!
//! Event-driven discovery lives in `snapfeed-watcher` and reuses the ordering
//! and walker from here, so both strategies agree on what "newest" means.

pub mod error;
pub mod ordering;
pub mod payload;
pub mod polling;
pub mod stats;
pub mod walker;

pub use error::DiscoveryError;
pub use ordering::{MalformedName, NameKind, NameOrdering, TEMP_SUFFIX, pick_maximum};
pub use payload::{FsPayloadReader, PayloadReader};
pub use polling::PollingDiscovery;
pub use stats::{CycleReport, DiscoveryStats, StatsSnapshot};
pub use walker::{DIRECTORY_LEVELS, HierarchyWalker, list_entry_names};
