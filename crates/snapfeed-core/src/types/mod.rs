//! Domain types shared across snapfeed.
//!
//! # Module Organization
//!
//! - [`source`] - Source names and their hierarchy roots
//! - [`payload`] - Opaque snapshot payloads
//! - [`subscriber`] - Subscriber identifiers
//!
//! All public types are re-exported at this module level and at the crate root:
//!
//! ```
//! use snapfeed_core::{Payload, Source, SourceName, SubscriberId};
//! ```

mod payload;
mod source;
mod subscriber;

pub use payload::Payload;
pub use source::{Source, SourceName};
pub use subscriber::SubscriberId;
