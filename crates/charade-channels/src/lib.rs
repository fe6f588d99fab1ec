//! `charade-channels` — the seams between the turn pipeline and the outside
//! world: inbound events, outbound delivery, and identity lookup.
//!
//! The core never talks to a chat platform directly. Platform adapters hand
//! it [`InboundMessage`]s and implement [`ChatPort`] for delivery and
//! [`IdentityDirectory`] for mention resolution.

pub mod error;
pub mod identity;
pub mod port;
pub mod types;

pub use error::ChannelError;
pub use identity::{Identity, IdentityDirectory, IdentityError};
pub use port::ChatPort;
pub use types::{InboundMessage, OutboundMessage};
