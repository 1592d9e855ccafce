//! Subscriber identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque identifier for one live subscriber connection.
///
/// Ids are handed out by the fan-out engine and never reused within a
/// process, so a stale id left in a delivery queue can never reach a newer
/// subscriber.
///
/// # Examples
///
/// ```
/// use snapfeed_core::SubscriberId;
///
/// let id = SubscriberId::new(7);
/// assert_eq!(id.as_u64(), 7);
/// assert_eq!(id.to_string(), "sub-7");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(pub u64);

impl SubscriberId {
    /// Creates a subscriber id from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the inner value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}
