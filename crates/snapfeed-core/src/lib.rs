//! Core types, configuration, and collaborator traits for snapfeed.
//!
//! This crate provides the foundational pieces shared by the discovery,
//! watcher, and fan-out crates:
//!
//! - Error types for configuration loading and validation
//! - Configuration structures ([`Config`], [`DiscoveryConfig`], [`FanoutConfig`])
//! - Domain types ([`Source`], [`SourceName`], [`Payload`], [`SubscriberId`])
//! - The [`Publisher`] and [`SourceRegistry`] boundaries between components
//! - Type aliases for `FxHashMap`/`FxHashSet`
//!
//! # Crate Dependencies
//!
//! ```text
//! snapfeed-cli ──► snapfeed-discovery ──► snapfeed-core
//!              ├─► snapfeed-watcher ───► snapfeed-discovery
//!              └─► snapfeed-fanout ────► snapfeed-core
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hash;
pub mod registry;
pub mod types;

pub use config::{
    Config, DiscoveryConfig, DiscoveryStrategy, FanoutConfig, SourceConfig, WatchBackendKind,
};
pub use error::ConfigError;
pub use hash::{FxHashMap, FxHashSet, fx_hash_map, fx_hash_set};
pub use registry::{InMemorySources, Publisher, SourceRegistry};
pub use types::{Payload, Source, SourceName, SubscriberId};
