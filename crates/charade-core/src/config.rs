use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level config (charade.toml + CHARADE_* env overrides).
///
/// Every value is injected into the core components — none of them reach for
/// process state on their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharadeConfig {
    pub persona: PersonaConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub features: FeatureConfig,
}

impl CharadeConfig {
    /// Load config: explicit path > CHARADE_CONFIG env > ~/.charade/charade.toml,
    /// with CHARADE_* environment variables overriding file values.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: CharadeConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CHARADE_").split("_"))
            .extract()
            .map_err(|e| crate::error::CharadeError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.charade/charade.toml", home)
}

/// The character the agent impersonates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Display name of the persona (substituted into the system templates).
    pub name: String,
    /// The agent's own platform user id — used to recognise self-mentions.
    pub self_id: String,
    /// Free-form character description appended to the system directive.
    pub description: Option<String>,
    /// Example dialogue (speaker-prefixed lines) appended after the description.
    pub example_dialogue: Option<String>,
    /// Which system template revision to use.
    #[serde(default)]
    pub template_version: TemplateVersion,
}

/// System template revision selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TemplateVersion {
    #[serde(rename = "v1")]
    V1,
    #[serde(rename = "v1.1")]
    V1_1,
    #[default]
    #[serde(rename = "v2")]
    V2,
}

/// Admission control bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Minimum interval between two admitted completions (milliseconds).
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,
    /// Lower bound of the random extra interval (milliseconds).
    #[serde(default = "default_min_jitter_ms")]
    pub min_jitter_ms: u64,
    /// Upper bound of the random extra interval (milliseconds).
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
    /// Probability (0–1) of dropping a non-addressed message that passed
    /// the throttle window.
    #[serde(default = "default_drop_probability")]
    pub drop_probability: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: default_base_interval_ms(),
            min_jitter_ms: default_min_jitter_ms(),
            max_jitter_ms: default_max_jitter_ms(),
            drop_probability: default_drop_probability(),
        }
    }
}

/// Per-conversation history bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum retained turns per conversation (oldest dropped on overflow).
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Token budget for the history slice sent to the model.
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            token_budget: default_token_budget(),
        }
    }
}

/// Pre-screening of long inputs before completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Inputs whose estimated token count exceeds this are screened.
    #[serde(default = "default_safety_threshold")]
    pub token_threshold: usize,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token_threshold: default_safety_threshold(),
        }
    }
}

/// Completion service endpoint and sampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
    /// Override for the API base URL (default: https://api.openai.com).
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub presence_penalty: f32,
    #[serde(default)]
    pub frequency_penalty: f32,
    /// Whole-request timeout (milliseconds).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Optional HTTP(S) proxy URL for the completion calls.
    pub proxy: Option<String>,
}

/// Feature flags for optional prompt directives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Offer the model a cooperative "decline to respond" sentinel.
    #[serde(default = "bool_true")]
    pub skip_directive: bool,
    /// Append the trailing anti-override guard directive after history.
    #[serde(default = "bool_true")]
    pub guard_directive: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            skip_directive: bool_true(),
            guard_directive: bool_true(),
        }
    }
}

fn default_base_interval_ms() -> u64 {
    10_000
}

fn default_min_jitter_ms() -> u64 {
    3_000
}

fn default_max_jitter_ms() -> u64 {
    5_000
}

fn default_drop_probability() -> f64 {
    0.9
}

fn default_max_turns() -> usize {
    10
}

fn default_token_budget() -> usize {
    1_024
}

fn default_safety_threshold() -> usize {
    128
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f32 {
    0.6
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn bool_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_fills_defaults() {
        let toml = r#"
            [persona]
            name = "小明"
            self_id = "10001"

            [provider]
            api_key = "sk-test"
        "#;
        let config: CharadeConfig = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .expect("config should parse");

        assert_eq!(config.persona.name, "小明");
        assert_eq!(config.persona.template_version, TemplateVersion::V2);
        assert_eq!(config.throttle.base_interval_ms, 10_000);
        assert_eq!(config.throttle.min_jitter_ms, 3_000);
        assert_eq!(config.throttle.max_jitter_ms, 5_000);
        assert!((config.throttle.drop_probability - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.history.max_turns, 10);
        assert!(!config.safety.enabled);
        assert_eq!(config.provider.model, "gpt-3.5-turbo");
        assert!(config.features.guard_directive);
    }

    #[test]
    fn template_version_spelling() {
        let toml = r#"
            [persona]
            name = "n"
            self_id = "1"
            template_version = "v1.1"

            [provider]
            api_key = "k"
        "#;
        let config: CharadeConfig = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .expect("config should parse");
        assert_eq!(config.persona.template_version, TemplateVersion::V1_1);
    }

    #[test]
    fn missing_persona_section_is_an_error() {
        let toml = r#"
            [provider]
            api_key = "k"
        "#;
        let result: std::result::Result<CharadeConfig, _> =
            Figment::new().merge(Toml::string(toml)).extract();
        assert!(result.is_err());
    }
}
