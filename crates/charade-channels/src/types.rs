use serde::{Deserialize, Serialize};

use charade_core::types::{ConversationId, UserId};

/// A message received from the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The room or direct channel the message arrived in.
    pub conversation_id: ConversationId,

    /// Platform-native identifier for the author.
    pub author_id: UserId,

    /// Human-readable display name for the author.
    pub author_name: String,

    /// Plain text content, possibly containing mention tokens.
    pub text: String,
}

/// A message to be delivered to the chat platform.
///
/// Delivery is fire-and-forget; the core requires no confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub conversation_id: ConversationId,

    pub text: String,

    /// When set, the adapter prefixes the delivery with an explicit mention
    /// of this user.
    pub mention_user_id: Option<UserId>,
}
