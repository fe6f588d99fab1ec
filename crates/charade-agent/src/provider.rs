use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::stream::StreamEvent;

/// A single message in a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Request to the completion service.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub stream: bool,
}

/// Full response from a non-streaming completion call.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
}

/// Common interface to the completion service.
///
/// The streaming variant drives the turn pipeline; the non-streaming variant
/// serves the safety gate's single classification call.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// Send a non-streaming request and wait for the full response.
    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Stream response events through a channel.
    /// Default: falls back to non-streaming send, emits TextDelta + Done.
    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let resp = self.send(req).await?;
        let _ = tx.send(StreamEvent::TextDelta { text: resp.content }).await;
        let _ = tx
            .send(StreamEvent::Done {
                stop_reason: "stop".to_string(),
            })
            .await;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}
