//! Error types for the snapfeed-core crate.
//!
//! This module provides the [`ConfigError`] type for configuration-related errors
//! that can occur when the service configuration is loaded or validated.

use camino::Utf8PathBuf;

/// Errors that can occur during configuration loading and validation.
///
/// # Examples
///
/// ```
/// use snapfeed_core::ConfigError;
/// use camino::Utf8PathBuf;
///
/// let error = ConfigError::MissingFile(Utf8PathBuf::from("/etc/snapfeed.json"));
/// assert!(error.to_string().contains("/etc/snapfeed.json"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A source definition is invalid.
    #[error("invalid source '{name}': {reason}")]
    InvalidSource {
        /// The name of the offending source (may be empty).
        name: String,
        /// Explanation of why the source is invalid.
        reason: String,
    },

    /// The configuration file does not exist.
    #[error("configuration file not found: {0}")]
    MissingFile(Utf8PathBuf),

    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// An I/O error occurred while reading configuration.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates a new [`ConfigError::InvalidOption`] error.
    #[inline]
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new [`ConfigError::InvalidSource`] error.
    #[inline]
    pub fn invalid_source(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSource {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_source_display() {
        let error = ConfigError::invalid_source("daq-main", "duplicate source name");
        let msg = error.to_string();
        assert!(msg.contains("daq-main"));
        assert!(msg.contains("duplicate"));
    }

    #[test]
    fn test_missing_file_display() {
        let error = ConfigError::MissingFile(Utf8PathBuf::from("/missing/snapfeed.json"));
        assert!(error.to_string().contains("/missing/snapfeed.json"));
    }

    #[test]
    fn test_invalid_option_display() {
        let error = ConfigError::invalid_option("fanout.workers", "must be positive");
        let msg = error.to_string();
        assert!(msg.contains("fanout.workers"));
        assert!(msg.contains("must be positive"));
    }
}
