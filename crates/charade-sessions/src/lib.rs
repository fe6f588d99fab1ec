//! `charade-sessions` — per-conversation state, in memory by design.
//!
//! # Overview
//!
//! A conversation's state is grouped under one [`ConversationSession`]:
//! the bounded history log, the throttle timestamp, the per-user deferred
//! retry slots, and the in-flight completion latch. Sessions are created
//! lazily on first message and live for the process lifetime — nothing is
//! persisted, and nothing survives a restart.
//!
//! The [`SessionRegistry`] maps `ConversationId` → `Arc<ConversationSession>`
//! and is injected into every pipeline operation; there are no process-wide
//! mutable maps. Concurrent turns for different conversations never contend
//! on a shared lock.

pub mod cost;
pub mod log;
pub mod registry;
pub mod throttle;

pub use cost::estimate_tokens;
pub use log::HistoryLog;
pub use registry::{CompletionGuard, ConversationSession, SessionRegistry};
pub use throttle::{RetrySlots, ThrottleState};
