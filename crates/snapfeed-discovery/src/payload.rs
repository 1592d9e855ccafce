//! Reading snapshot contents.

use std::sync::Arc;

use camino::Utf8Path;
use snapfeed_core::Payload;

use crate::error::DiscoveryError;

/// Reads the full contents of a selected snapshot.
///
/// Discovery only reads leaves that passed the temporary-suffix filter, so a
/// reader never sees a half-written file under normal operation. A leaf can
/// still disappear between selection and read; that surfaces as
/// [`DiscoveryError::PayloadRead`].
pub trait PayloadReader: Send + Sync {
    /// Reads the snapshot at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::PayloadRead`] if the file is gone or unreadable.
    fn read(&self, path: &Utf8Path) -> Result<Payload, DiscoveryError>;
}

/// Reads snapshots from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsPayloadReader;

impl PayloadReader for FsPayloadReader {
    fn read(&self, path: &Utf8Path) -> Result<Payload, DiscoveryError> {
        std::fs::read(path)
            .map(Payload::from)
            .map_err(|source| DiscoveryError::payload_read(path, source))
    }
}

impl<R: PayloadReader + ?Sized> PayloadReader for Arc<R> {
    #[inline]
    fn read(&self, path: &Utf8Path) -> Result<Payload, DiscoveryError> {
        (**self).read(path)
    }
}
