//! The outbound side of a subscriber.

use std::future::Future;

use snapfeed_core::Payload;
use tokio::sync::mpsc;

use crate::error::DeliveryError;

/// A transport that can carry payloads to one subscriber.
///
/// The engine never calls `send` on the same connection concurrently: a
/// subscriber has at most one pending payload and one worker handles it at a
/// time.
pub trait Connection: Send + Sync + 'static {
    /// Sends one payload.
    ///
    /// # Errors
    ///
    /// Any error is treated as a disconnect.
    fn send(&self, payload: Payload) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// A connection that forwards payloads into a tokio channel.
///
/// Useful for in-process subscribers. Dropping the receiver closes the
/// connection.
///
/// # Examples
///
/// ```
/// use snapfeed_core::Payload;
/// use snapfeed_fanout::{ChannelConnection, Connection};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (connection, mut rx) = ChannelConnection::new(4);
/// connection.send(Payload::from_static(b"P1")).await.unwrap();
/// assert_eq!(rx.recv().await.unwrap().as_bytes(), b"P1");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    tx: mpsc::Sender<Payload>,
}

impl ChannelConnection {
    /// Creates a connection and the receiving end of its channel.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl Connection for ChannelConnection {
    async fn send(&self, payload: Payload) -> Result<(), DeliveryError> {
        self.tx.send(payload).await.map_err(|_| DeliveryError::Closed)
    }
}
