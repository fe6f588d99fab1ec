use charade_core::config::ProviderConfig;

use crate::prompt::{PromptBuilder, PromptContext};
use crate::provider::{ChatRequest, LlmProvider, Message, Role};

/// Central persona runtime — holds the completion provider, the prompt
/// builder, and the sampling parameters. Shared across all conversations
/// via `Arc` in the host's context.
pub struct PersonaRuntime {
    provider: Box<dyn LlmProvider>,
    prompt: PromptBuilder,
    model: String,
    temperature: f32,
    presence_penalty: f32,
    frequency_penalty: f32,
}

impl PersonaRuntime {
    pub fn new(provider: Box<dyn LlmProvider>, prompt: PromptBuilder, config: &ProviderConfig) -> Self {
        Self {
            provider,
            prompt,
            model: config.model.clone(),
            temperature: config.temperature,
            presence_penalty: config.presence_penalty,
            frequency_penalty: config.frequency_penalty,
        }
    }

    pub fn provider(&self) -> &dyn LlmProvider {
        &*self.provider
    }

    pub fn prompt(&self) -> &PromptBuilder {
        &self.prompt
    }

    /// Build the streaming completion request for one turn.
    pub fn completion_request(&self, ctx: PromptContext) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: ctx.into_messages(),
            temperature: self.temperature,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
            stream: true,
        }
    }

    /// Build the single-message, non-streaming request used by the safety
    /// gate's classification call.
    pub fn classification_request(&self, content: String) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: Role::User,
                content,
            }],
            temperature: self.temperature,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
            stream: false,
        }
    }
}
