//! Shared context interface for all platform hosts.

use charade_channels::{ChatPort, IdentityDirectory};
use charade_core::config::CharadeConfig;
use charade_sessions::SessionRegistry;

use crate::runtime::PersonaRuntime;

/// Minimal context interface required by the turn pipeline.
///
/// Implemented by each host (console binary, platform adapters, tests).
/// The pipeline reaches every collaborator through this trait; it holds no
/// state of its own.
pub trait BotContext: Send + Sync {
    fn config(&self) -> &CharadeConfig;
    fn sessions(&self) -> &SessionRegistry;
    fn runtime(&self) -> &PersonaRuntime;
    fn identities(&self) -> &dyn IdentityDirectory;
    fn port(&self) -> &dyn ChatPort;
}
