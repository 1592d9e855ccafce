//! Opaque snapshot payloads.

use std::fmt;

use bytes::Bytes;

/// The content of a snapshot file, passed through unmodified.
///
/// Backed by [`Bytes`], so cloning a payload for every subscriber of a source
/// shares one buffer.
///
/// # Examples
///
/// ```
/// use snapfeed_core::Payload;
///
/// let payload = Payload::from_static(b"{\"lastUpdate\":1}");
/// let copy = payload.clone();
/// assert_eq!(copy.len(), payload.len());
/// assert_eq!(copy, payload);
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Payload(Bytes);

impl Payload {
    /// Wraps an existing buffer.
    #[inline]
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Creates a payload from a static byte slice without copying.
    #[inline]
    #[must_use]
    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }

    /// Returns the payload bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the underlying buffer.
    #[inline]
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Returns the payload size in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Payloads can be megabytes; only the size is useful in logs.
impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload").field("len", &self.0.len()).finish()
    }
}

impl From<Vec<u8>> for Payload {
    #[inline]
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<Bytes> for Payload {
    #[inline]
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Payload {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_debug_hides_content() {
        let payload = Payload::from(b"secret-ish".to_vec());
        let debug = format!("{payload:?}");
        assert!(debug.contains("len"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_payload_empty() {
        assert!(Payload::default().is_empty());
        assert_eq!(Payload::from_static(b"abc").len(), 3);
    }
}
