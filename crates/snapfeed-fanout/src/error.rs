//! Error types for the snapfeed-fanout crate.
//!
//! - [`DeliveryError`]: a send to one subscriber failed
//! - [`Rejection`]: a subscription request was refused

use std::time::Duration;

use snapfeed_core::SourceName;

/// Errors that can occur while sending a payload to a subscriber.
///
/// Every delivery error is treated as a disconnect: the subscriber is
/// unsubscribed and the worker moves on.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The peer is gone.
    #[error("connection closed")]
    Closed,

    /// The send did not complete in time.
    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    /// The transport failed.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other transport-specific failure.
    #[error("{0}")]
    Transport(String),
}

impl DeliveryError {
    /// Creates a new [`DeliveryError::Transport`] error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// Reasons a subscription request is refused.
///
/// The `Display` text is suitable as a close reason sent back to the peer.
///
/// # Examples
///
/// ```
/// use snapfeed_fanout::Rejection;
///
/// assert_eq!(Rejection::NotReady.to_string(), "discovery not yet initialized");
/// assert!(Rejection::NotReady.is_retryable());
/// assert!(!Rejection::MissingSource.is_retryable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The request named no source.
    #[error("no source specified")]
    MissingSource,

    /// No source registry is attached yet.
    #[error("discovery not yet initialized")]
    NotReady,

    /// The named source is not tracked.
    #[error("source does not exist: {0}")]
    UnknownSource(SourceName),
}

impl Rejection {
    /// Returns `true` if the same request may succeed later without change.
    #[inline]
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_source_display() {
        let rejection = Rejection::UnknownSource(SourceName::new("ghost"));
        assert_eq!(rejection.to_string(), "source does not exist: ghost");
        assert!(!rejection.is_retryable());
    }

    #[test]
    fn test_delivery_error_display() {
        let err = DeliveryError::Timeout(Duration::from_millis(50));
        assert!(err.to_string().contains("50ms"));
        assert_eq!(DeliveryError::transport("reset by peer").to_string(), "reset by peer");
    }
}
