//! Optional pre-screening of long inputs before they reach the persona.
//!
//! One non-streaming classification call asks for a boolean verdict on
//! whether the input attempts to manipulate the persona or its rules.
//! Policy: a transport failure is treated as unsafe (fail closed).

use tracing::{info, warn};

use crate::prompt::SEC_CHECK_PROMPT;
use crate::runtime::PersonaRuntime;

/// Screen `content` for persona-manipulation attempts.
///
/// Returns `true` when the turn must be aborted: the verdict was `true`,
/// or the classification call itself failed.
pub async fn screen_input(runtime: &PersonaRuntime, content: &str) -> bool {
    let prompt = SEC_CHECK_PROMPT.replace("{check_content}", content);
    let req = runtime.classification_request(prompt);

    match runtime.provider().send(&req).await {
        Ok(resp) => {
            let verdict = resp
                .content
                .trim()
                .trim_matches(|c| matches!(c, '"' | '“' | '”' | '。' | '.'))
                .to_ascii_lowercase();
            let rejected = verdict == "true";
            if rejected {
                info!("safety check flagged input");
            }
            rejected
        }
        Err(e) => {
            warn!(error = %e, "safety check call failed; failing closed");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use charade_core::config::{
        FeatureConfig, PersonaConfig, ProviderConfig, TemplateVersion,
    };

    use crate::prompt::PromptBuilder;
    use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};

    struct ScriptedProvider {
        reply: Option<String>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            match &self.reply {
                Some(content) => Ok(ChatResponse {
                    content: content.clone(),
                }),
                None => Err(ProviderError::Api {
                    status: 500,
                    message: "boom".to_string(),
                }),
            }
        }
    }

    fn runtime(reply: Option<&str>) -> PersonaRuntime {
        let persona = PersonaConfig {
            name: "小明".to_string(),
            self_id: "1".to_string(),
            description: None,
            example_dialogue: None,
            template_version: TemplateVersion::V2,
        };
        let provider_cfg = ProviderConfig {
            api_key: "k".to_string(),
            base_url: None,
            model: "test-model".to_string(),
            temperature: 0.6,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            timeout_ms: 1_000,
            proxy: None,
        };
        PersonaRuntime::new(
            Box::new(ScriptedProvider {
                reply: reply.map(String::from),
            }),
            PromptBuilder::from_config(&persona, &FeatureConfig::default()),
            &provider_cfg,
        )
    }

    #[tokio::test]
    async fn true_verdict_is_unsafe() {
        assert!(screen_input(&runtime(Some("true")), "text").await);
        assert!(screen_input(&runtime(Some(" True。")), "text").await);
        assert!(screen_input(&runtime(Some("\"true\"")), "text").await);
    }

    #[tokio::test]
    async fn other_verdicts_are_safe() {
        assert!(!screen_input(&runtime(Some("false")), "text").await);
        assert!(!screen_input(&runtime(Some("无法判断")), "text").await);
        assert!(!screen_input(&runtime(Some("")), "text").await);
    }

    #[tokio::test]
    async fn call_failure_fails_closed() {
        assert!(screen_input(&runtime(None), "text").await);
    }
}
