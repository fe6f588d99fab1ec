use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use charade_core::config::ProviderConfig;

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
use crate::stream::{parse_sse_line, SseParsed, StreamEvent};

/// OpenAI-compatible completion client.
///
/// The request timeout and optional proxy are baked into the underlying
/// `reqwest::Client` at construction, so every call — streaming included —
/// inherits them.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_millis(config.timeout_ms));
        if let Some(proxy_url) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }
        Ok(Self {
            client: builder.build()?,
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = build_request_body(req, false);
        let url = format!("{}/v1/chat/completions", self.base_url);

        debug!(model = %req.model, "sending completion request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "completion API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let content = api_resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(ChatResponse { content })
    }

    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let body = build_request_body(req, true);
        let url = format!("{}/v1/chat/completions", self.base_url);

        debug!(model = %req.model, "sending streaming completion request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "streaming completion API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        process_stream(resp, tx).await;
        Ok(())
    }
}

fn build_request_body(req: &ChatRequest, stream: bool) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = req
        .messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": m.role,
                "content": m.content,
            })
        })
        .collect();

    serde_json::json!({
        "model": req.model,
        "messages": messages,
        "temperature": req.temperature,
        "presence_penalty": req.presence_penalty,
        "frequency_penalty": req.frequency_penalty,
        "stream": stream,
    })
}

/// Consume the SSE response body and emit StreamEvents.
///
/// Each data line carries a JSON delta object; `data: [DONE]` is the
/// terminal sentinel. A malformed frame is skipped and the stream continues;
/// a transport error emits `StreamEvent::Error` and abandons the read.
async fn process_stream(resp: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    use futures_util::StreamExt;

    let mut stop_reason = String::new();
    let mut line_buf = String::new();

    let mut byte_stream = resp.bytes_stream();

    'read: while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let text = match std::str::from_utf8(&chunk) {
            Ok(t) => t,
            Err(_) => continue,
        };

        line_buf.push_str(text);
        let lines: Vec<&str> = line_buf.split('\n').collect();
        let (complete, remainder) = lines.split_at(lines.len() - 1);
        let remainder = remainder.first().unwrap_or(&"").to_string();

        for line in complete {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(SseParsed::Data(data)) = parse_sse_line(line) {
                // The service signals end-of-stream with a literal `[DONE]`.
                if data.trim() == "[DONE]" {
                    break 'read;
                }

                let chunk_resp: StreamChunk = match serde_json::from_str(&data) {
                    Ok(c) => c,
                    Err(e) => {
                        debug!(error = %e, "skipping malformed stream frame");
                        continue;
                    }
                };

                for choice in &chunk_resp.choices {
                    if let Some(reason) = &choice.finish_reason {
                        if !reason.is_empty() {
                            stop_reason = reason.clone();
                        }
                    }
                    if let Some(content) = &choice.delta.content {
                        if !content.is_empty()
                            && tx
                                .send(StreamEvent::TextDelta {
                                    text: content.clone(),
                                })
                                .await
                                .is_err()
                        {
                            return; // receiver dropped
                        }
                    }
                }
            }
        }

        line_buf = remainder;
    }

    let _ = tx.send(StreamEvent::Done { stop_reason }).await;
}

// Completion API response types (deserialization only)

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
