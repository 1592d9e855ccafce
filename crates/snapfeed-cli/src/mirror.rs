//! A connection that mirrors the newest snapshot of a source into a file.
//!
//! Each delivery replaces `<dir>/<source>.latest` atomically: the payload is
//! written to a staging file next to it and renamed into place, so readers
//! never observe a partial snapshot.

use camino::{Utf8Path, Utf8PathBuf};
use snapfeed_core::Payload;
use snapfeed_fanout::{Connection, DeliveryError};
use tracing::trace;

const MIRROR_EXTENSION: &str = "latest";

/// Writes every delivered payload to a per-source file.
#[derive(Debug, Clone)]
pub struct MirrorConnection {
    target: Utf8PathBuf,
    staging: Utf8PathBuf,
}

impl MirrorConnection {
    /// Creates a connection mirroring `source` into `dir`.
    pub fn new(dir: &Utf8Path, source: &str) -> Self {
        Self {
            target: dir.join(format!("{source}.{MIRROR_EXTENSION}")),
            staging: dir.join(format!("{source}.{MIRROR_EXTENSION}.tmp")),
        }
    }

    /// Returns the file the newest payload lands in.
    pub fn target(&self) -> &Utf8Path {
        &self.target
    }
}

impl Connection for MirrorConnection {
    async fn send(&self, payload: Payload) -> Result<(), DeliveryError> {
        let len = payload.len();
        tokio::fs::write(&self.staging, payload).await?;
        tokio::fs::rename(&self.staging, &self.target).await?;
        trace!(target_file = %self.target, bytes = len, "Mirror updated");
        Ok(())
    }
}
