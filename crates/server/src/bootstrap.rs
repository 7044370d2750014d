use std::sync::Arc;
use std::time::Duration;

use pengpt_agent::guardrails::GuardrailPolicy;
use pengpt_agent::llm::{CompletionError, OpenAiCompatibleClient};
use pengpt_agent::runtime::{AgentRuntime, DispatchSettings};
use pengpt_chat::console::{ConsoleResponder, ConsoleSource};
use pengpt_chat::events::{BotIdentity, MessageHandler, NoopResponder, Responder};
use pengpt_chat::listener::{EventSource, ListenerRunner, NoopEventSource, ReconnectPolicy};
use pengpt_core::config::{AppConfig, ChatTransport, ConfigError, LoadOptions};
use pengpt_core::conversation::ConversationStore;
use pengpt_core::cooldown::CooldownGate;
use pengpt_core::rotation::{RotationError, RotationScheduler};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub agent_runtime: Arc<AgentRuntime>,
    pub listener: ListenerRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("credential/model rotation setup failed: {0}")]
    Rotation(#[from] RotationError),
    #[error("completion client setup failed: {0}")]
    Client(#[source] CompletionError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let scheduler = RotationScheduler::new(
        config.llm.api_keys.clone(),
        config.llm.tiers.clone(),
        &config.llm.default_tier,
        config.conversation.model_cooldown(),
    )?;
    info!(
        event_name = "system.bootstrap.rotation_ready",
        correlation_id = "bootstrap",
        credentials = config.llm.api_keys.len(),
        tiers = config.llm.tiers.len(),
        default_tier = %config.llm.default_tier,
        "credential pool and model tiers loaded"
    );

    let client = OpenAiCompatibleClient::new(
        config.llm.base_url.clone(),
        Duration::from_secs(config.llm.timeout_secs),
    )
    .map_err(BootstrapError::Client)?;

    let agent_runtime = Arc::new(AgentRuntime::new(
        Arc::new(ConversationStore::new(config.conversation.max_memory)),
        Arc::new(CooldownGate::new(config.conversation.user_cooldown())),
        Arc::new(scheduler),
        Arc::new(client),
        GuardrailPolicy::from_config(&config.guardrails),
        DispatchSettings::from_config(&config),
    ));

    let (source, responder) = chat_transport(config.chat.transport);

    let identity =
        BotIdentity { user_id: config.chat.bot_user_id.clone(), mention: config.chat.mention() };
    let handler =
        MessageHandler::new(agent_runtime.clone(), responder, identity, config.chat.ping_only);
    let listener = ListenerRunner::new(source, Arc::new(handler), ReconnectPolicy::default());

    info!(
        event_name = "system.bootstrap.complete",
        correlation_id = "bootstrap",
        transport = ?config.chat.transport,
        "application bootstrap complete"
    );

    Ok(Application { config, agent_runtime, listener })
}

fn chat_transport(transport: ChatTransport) -> (Arc<dyn EventSource>, Arc<dyn Responder>) {
    match transport {
        ChatTransport::Console => {
            let source: Arc<dyn EventSource> = Arc::new(ConsoleSource::stdin());
            let responder: Arc<dyn Responder> = Arc::new(ConsoleResponder::stdout());
            (source, responder)
        }
        ChatTransport::Noop => {
            let source: Arc<dyn EventSource> = Arc::new(NoopEventSource);
            let responder: Arc<dyn Responder> = Arc::new(NoopResponder);
            (source, responder)
        }
    }
}
