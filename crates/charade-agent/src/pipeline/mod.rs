//! Shared turn pipeline — platform-agnostic admission, addressing, and
//! completion handling.
//!
//! Platform adapters implement [`BotContext`] and call [`handle_message`]
//! for every inbound event; everything else (gate decisions, history
//! bookkeeping, safety screening, stream segmentation, delivery) happens
//! here, once.

pub mod address;
pub mod context;
pub mod emit;
pub mod gate;
pub mod process;

pub use address::{classify, resolve, AddressingKind, ResolvedTurn};
pub use context::BotContext;
pub use gate::{admit, Admission};
pub use process::handle_message;
