use async_trait::async_trait;

use crate::{error::ChannelError, types::OutboundMessage};

/// Outbound delivery surface implemented by every platform adapter.
///
/// Implementations must be `Send + Sync` so a connected adapter can be
/// shared across Tokio tasks and send concurrently through `&self`.
#[async_trait]
pub trait ChatPort: Send + Sync {
    /// Stable lowercase identifier for this surface (e.g. `"console"`).
    fn name(&self) -> &str;

    /// Deliver a single outbound message. Fire-and-forget: the pipeline
    /// logs failures but never retries or waits for confirmation.
    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError>;
}
