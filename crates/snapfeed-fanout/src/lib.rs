//! Latest-wins fan-out of snapshots to subscribers.
//!
//! Discovery hands each new snapshot to [`FanoutEngine`] through the
//! [`Publisher`](snapfeed_core::Publisher) trait. The engine delivers it to
//! every subscriber of the source with a fixed pool of tokio workers. A
//! subscriber that falls behind never sees a backlog: only the newest
//! undelivered payload is kept for it.
//!
//! - [`Connection`]: the outbound transport of one subscriber
//! - [`ChannelConnection`]: an in-process connection over a tokio channel
//! - [`Rejection`]: why a subscription was refused
//! - [`DeliveryError`]: why a send failed (always treated as a disconnect)

pub mod connection;
pub mod engine;
pub mod error;

pub use connection::{ChannelConnection, Connection};
pub use engine::FanoutEngine;
pub use error::{DeliveryError, Rejection};
