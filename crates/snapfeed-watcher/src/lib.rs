//! Event-driven snapshot discovery.
//!
//! Instead of walking every source from its root on each cycle, this crate
//! keeps a chain of single-directory watches along the newest branch of each
//! source and only reacts to entries that appear there.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   created names   ┌──────────────┐
//! │ WatchBackend         │ ────────────────► │ WatchChain   │  one per source
//! │ notify or listing    │ ◄──────────────── │ levels 0..=4 │
//! └──────────────────────┘   watch / unwatch └──────┬───────┘
//!                                                   │ new leaf
//!                                                   ▼
//!                                       ┌──────────────────────┐
//!                                       │ WatchingDiscovery    │ ──► Publisher
//!                                       │ read payload, report │
//!                                       └──────────────────────┘
//! ```
//!
//! Naming rules and the walker's single-branch semantics come from
//! `snapfeed-discovery`, so watching and polling converge on the same leaf.
//!
//! # Crate Dependencies
//!
//! ```text
//! snapfeed-cli ──► snapfeed-watcher ──► snapfeed-discovery ──► snapfeed-core
//!              └─► snapfeed-fanout ─────────────────────────►
//! ```

pub mod backend;
pub mod chain;
pub mod discovery;
pub mod error;
pub mod events;

pub use backend::{CreatedNames, ListingBackend, NotifyBackend, WatchBackend, create_backend};
pub use chain::{CHAIN_DEPTH, ChainOutcome, WatchChain};
pub use discovery::{BackendFactory, WatchingDiscovery};
pub use error::WatchError;
pub use events::{CreatedEntries, CreatedEntry, created_entries};
