//! Configuration structures for snapfeed.
//!
//! This module provides configuration types for all components of the service:
//!
//! - [`DiscoveryConfig`] - Discovery schedules, strategy, and watch backend
//! - [`FanoutConfig`] - Delivery worker pool and timeouts
//! - [`SourceConfig`] - One tracked source (name and hierarchy root)
//! - [`Config`] - Root configuration combining all settings
//!
//! All configuration types implement [`Default`], and missing JSON fields fall
//! back to those defaults.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::hash::{FxHashSet, fx_hash_set};
use crate::types::{Source, SourceName};

/// Which discovery strategies the driver runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStrategy {
    /// Periodic full rescans only.
    Polling,
    /// Incremental watch chains only.
    Watching,
    /// Both strategies on independent schedules.
    #[default]
    Both,
}

impl DiscoveryStrategy {
    /// Returns `true` if the polling strategy should run.
    #[inline]
    #[must_use]
    pub const fn runs_polling(self) -> bool {
        matches!(self, Self::Polling | Self::Both)
    }

    /// Returns `true` if the watching strategy should run.
    #[inline]
    #[must_use]
    pub const fn runs_watching(self) -> bool {
        matches!(self, Self::Watching | Self::Both)
    }
}

/// Mechanism used to observe directory changes for watch chains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchBackendKind {
    /// Kernel notifications through `notify` (inotify, `FSEvents`, ...).
    #[default]
    Native,
    /// Listing diffs, for filesystems that do not deliver notifications.
    Listing,
}

/// Configuration for snapshot discovery.
///
/// # Examples
///
/// ```
/// use snapfeed_core::DiscoveryConfig;
///
/// let config = DiscoveryConfig::default();
/// assert_eq!(config.poll_interval_ms, 200);
/// assert_eq!(config.temp_suffix, ".tmp");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Interval between polling cycles in milliseconds.
    pub poll_interval_ms: u64,

    /// Interval between watch cycles in milliseconds.
    pub watch_interval_ms: u64,

    /// Which strategies to run.
    pub strategy: DiscoveryStrategy,

    /// Notification mechanism for watch chains.
    pub watch_backend: WatchBackendKind,

    /// Suffix marking a snapshot that is still being written.
    pub temp_suffix: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            watch_interval_ms: 200,
            strategy: DiscoveryStrategy::Both,
            watch_backend: WatchBackendKind::Native,
            temp_suffix: ".tmp".to_owned(),
        }
    }
}

impl DiscoveryConfig {
    /// Returns the polling interval as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the watch interval as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }
}

/// Configuration for the fan-out engine.
///
/// # Examples
///
/// ```
/// use snapfeed_core::FanoutConfig;
///
/// let config = FanoutConfig::default();
/// assert_eq!(config.workers, 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Number of delivery workers.
    pub workers: usize,

    /// Upper bound on a single send, in milliseconds.
    ///
    /// A send that exceeds it is treated as a delivery failure.
    pub send_timeout_ms: u64,

    /// How long shutdown waits for workers to finish their current send.
    pub shutdown_timeout_ms: u64,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            send_timeout_ms: 5_000,
            shutdown_timeout_ms: 2_000,
        }
    }
}

impl FanoutConfig {
    /// Returns the send timeout as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Returns the shutdown timeout as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// A source as declared in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Stable source name, used by subscribers.
    pub name: String,

    /// Root of the source's time-partitioned hierarchy.
    pub root: Utf8PathBuf,
}

impl SourceConfig {
    /// Converts the declaration into a [`Source`].
    #[must_use]
    pub fn to_source(&self) -> Source {
        Source::new(SourceName::new(self.name.trim()), self.root.clone())
    }
}

/// Root configuration for snapfeed.
///
/// # Examples
///
/// ```
/// use snapfeed_core::Config;
///
/// let config = Config::from_json_str(
///     r#"{"sources": [{"name": "daq-main", "root": "/data/daq-main"}]}"#,
/// )?;
/// assert_eq!(config.sources.len(), 1);
/// assert_eq!(config.fanout.workers, 4);
/// # Ok::<(), snapfeed_core::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Discovery configuration.
    pub discovery: DiscoveryConfig,

    /// Fan-out configuration.
    pub fanout: FanoutConfig,

    /// Tracked sources.
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Parses and validates a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and the errors of
    /// [`validate`](Self::validate) for invalid values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingFile`] if the file does not exist, and
    /// the errors of [`from_json_str`](Self::from_json_str) otherwise.
    pub fn from_json_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::MissingFile(path.to_owned()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Checks option ranges and source declarations.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] for zero intervals, zero workers,
    /// or an empty temporary suffix, and [`ConfigError::InvalidSource`] for
    /// empty, path-like, or duplicate source names and empty roots.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery.poll_interval_ms == 0 {
            return Err(ConfigError::invalid_option(
                "discovery.poll_interval_ms",
                "must be positive",
            ));
        }
        if self.discovery.watch_interval_ms == 0 {
            return Err(ConfigError::invalid_option(
                "discovery.watch_interval_ms",
                "must be positive",
            ));
        }
        if self.discovery.temp_suffix.is_empty() {
            return Err(ConfigError::invalid_option(
                "discovery.temp_suffix",
                "must not be empty",
            ));
        }
        if self.fanout.workers == 0 {
            return Err(ConfigError::invalid_option(
                "fanout.workers",
                "must be positive",
            ));
        }

        let mut seen: FxHashSet<&str> = fx_hash_set();
        for source in &self.sources {
            let name = source.name.trim();
            if name.is_empty() {
                return Err(ConfigError::invalid_source(name, "name must not be empty"));
            }
            if name == "." || name == ".." || name.contains(['/', '\\']) {
                return Err(ConfigError::invalid_source(
                    name,
                    "name must not be a path or contain path separators",
                ));
            }
            if source.root.as_str().is_empty() {
                return Err(ConfigError::invalid_source(name, "root must not be empty"));
            }
            if !seen.insert(name) {
                return Err(ConfigError::invalid_source(name, "duplicate source name"));
            }
        }

        Ok(())
    }

    /// Returns the configured sources as domain values.
    #[must_use]
    pub fn tracked_sources(&self) -> Vec<Source> {
        self.sources.iter().map(SourceConfig::to_source).collect()
    }
}
