//! Local console host for the charade pipeline.
//!
//! Reads lines from stdin as inbound chat messages and prints the persona's
//! deliveries to stdout. Address the persona with `<at id="<self_id>"/>` in
//! the line, exactly as a platform adapter would.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use charade_agent::openai::OpenAiProvider;
use charade_agent::pipeline::{handle_message, BotContext};
use charade_agent::prompt::PromptBuilder;
use charade_agent::runtime::PersonaRuntime;
use charade_channels::{
    ChannelError, ChatPort, Identity, IdentityDirectory, IdentityError, InboundMessage,
    OutboundMessage,
};
use charade_core::config::CharadeConfig;
use charade_core::types::UserId;
use charade_sessions::SessionRegistry;

struct ConsolePort;

#[async_trait]
impl ChatPort for ConsolePort {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        match &msg.mention_user_id {
            Some(user) => println!("[{}] @{} {}", msg.conversation_id, user, msg.text),
            None => println!("[{}] {}", msg.conversation_id, msg.text),
        }
        Ok(())
    }
}

/// The console has no member directory; every lookup misses, which leaves
/// mention tokens untouched — the same degraded path a platform adapter
/// takes when its directory is unreachable.
struct ConsoleDirectory;

#[async_trait]
impl IdentityDirectory for ConsoleDirectory {
    async fn resolve(&self, user_id: &UserId) -> Result<Identity, IdentityError> {
        Err(IdentityError::NotFound(user_id.to_string()))
    }
}

struct AppState {
    config: CharadeConfig,
    sessions: SessionRegistry,
    runtime: PersonaRuntime,
    directory: ConsoleDirectory,
    port: ConsolePort,
}

impl BotContext for AppState {
    fn config(&self) -> &CharadeConfig {
        &self.config
    }

    fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    fn runtime(&self) -> &PersonaRuntime {
        &self.runtime
    }

    fn identities(&self) -> &dyn IdentityDirectory {
        &self.directory
    }

    fn port(&self) -> &dyn ChatPort {
        &self.port
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "charade=info".into()),
        )
        .init();

    // load config: CHARADE_CONFIG env > ~/.charade/charade.toml
    let config_path = std::env::var("CHARADE_CONFIG").ok();
    let config = CharadeConfig::load(config_path.as_deref())
        .map_err(|e| anyhow::anyhow!("config load failed: {e}"))?;

    let provider = OpenAiProvider::new(&config.provider)
        .map_err(|e| anyhow::anyhow!("provider setup failed: {e}"))?;
    let prompt = PromptBuilder::from_config(&config.persona, &config.features);
    let runtime = PersonaRuntime::new(Box::new(provider), prompt, &config.provider);
    let history_cap = config.history.max_turns;

    info!(persona = %config.persona.name, "charade console ready — type to chat");

    let state = Arc::new(AppState {
        config,
        sessions: SessionRegistry::new(history_cap),
        runtime,
        directory: ConsoleDirectory,
        port: ConsolePort,
    });

    let author_name = std::env::var("USER").unwrap_or_else(|_| "local".to_string());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let inbound = InboundMessage {
            conversation_id: "console".into(),
            author_id: UserId::from(author_name.as_str()),
            author_name: author_name.clone(),
            text: line,
        };
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            handle_message(state, inbound).await;
        });
    }

    warn!("stdin closed; shutting down");
    Ok(())
}
