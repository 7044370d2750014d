use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pengpt_agent::llm::NO_CONTENT_REPLY;
use pengpt_agent::runtime::AgentRuntime;
use thiserror::Error;
use tracing::{debug, info};

use crate::commands::{parse_command, CommandRouter};
use crate::replies::THINKING_PLACEHOLDER;

/// One inbound platform message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEvent {
    pub event_id: String,
    pub user_id: String,
    pub channel_id: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageHandle {
    pub channel_id: String,
    pub message_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    /// A command was applied and acknowledged.
    Acknowledged(String),
    /// A prompt was dispatched and the placeholder edited with the answer.
    Replied(String),
    Ignored,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResponderError {
    #[error("failed to send message: {0}")]
    Send(String),
    #[error("failed to edit message: {0}")]
    Edit(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Responder(#[from] ResponderError),
}

#[async_trait]
pub trait Responder: Send + Sync {
    async fn send(&self, channel_id: &str, text: &str) -> Result<MessageHandle, ResponderError>;
    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<(), ResponderError>;
}

#[derive(Default)]
pub struct NoopResponder;

#[async_trait]
impl Responder for NoopResponder {
    async fn send(&self, channel_id: &str, _text: &str) -> Result<MessageHandle, ResponderError> {
        Ok(MessageHandle { channel_id: channel_id.to_owned(), message_id: "noop".to_owned() })
    }

    async fn edit(&self, _handle: &MessageHandle, _text: &str) -> Result<(), ResponderError> {
        Ok(())
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(
        &self,
        event: &ChatEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: String,
    pub mention: String,
}

/// Routes a message either to the command router or, when addressed to the
/// bot and admitted by the cooldown gate, through the dispatch engine.
pub struct MessageHandler {
    runtime: Arc<AgentRuntime>,
    router: CommandRouter,
    responder: Arc<dyn Responder>,
    identity: BotIdentity,
    ping_only: Arc<AtomicBool>,
}

impl MessageHandler {
    pub fn new(
        runtime: Arc<AgentRuntime>,
        responder: Arc<dyn Responder>,
        identity: BotIdentity,
        ping_only: bool,
    ) -> Self {
        let ping_only = Arc::new(AtomicBool::new(ping_only));
        let router = CommandRouter::new(runtime.clone(), ping_only.clone());
        Self { runtime, router, responder, identity, ping_only }
    }

    pub fn ping_only(&self) -> bool {
        self.ping_only.load(Ordering::SeqCst)
    }

    fn extract_prompt(&self, text: &str) -> Option<String> {
        let addressed = text.contains(&self.identity.mention);
        if self.ping_only() && !addressed {
            return None;
        }
        let prompt = text.replace(&self.identity.mention, "");
        let prompt = prompt.trim();
        (!prompt.is_empty()).then(|| prompt.to_owned())
    }
}

#[async_trait]
impl EventHandler for MessageHandler {
    async fn handle(
        &self,
        event: &ChatEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        if event.user_id == self.identity.user_id {
            return Ok(HandlerResult::Ignored);
        }

        if let Some(command) = parse_command(&event.text) {
            let reply = self.router.route(&command, event.received_at);
            self.responder.send(&event.channel_id, &reply).await?;
            return Ok(HandlerResult::Acknowledged(reply));
        }

        let Some(prompt) = self.extract_prompt(&event.text) else {
            debug!(
                event_name = "chat.message.unaddressed",
                correlation_id = %ctx.correlation_id,
                "message not addressed to bot"
            );
            return Ok(HandlerResult::Ignored);
        };

        if !self.runtime.admit(&event.user_id, event.received_at) {
            return Ok(HandlerResult::Ignored);
        }

        let handle = self.responder.send(&event.channel_id, THINKING_PLACEHOLDER).await?;
        let outcome = self.runtime.respond(&event.user_id, &prompt, event.received_at).await;
        let reply = outcome.reply_text().unwrap_or_else(|| NO_CONTENT_REPLY.to_owned());
        self.responder.edit(&handle, &reply).await?;

        info!(
            event_name = "chat.message.replied",
            correlation_id = %ctx.correlation_id,
            user_id = %event.user_id,
            channel_id = %event.channel_id,
            "reply delivered"
        );
        Ok(HandlerResult::Replied(reply))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pengpt_agent::guardrails::GuardrailPolicy;
    use pengpt_agent::llm::{CompletionClient, CompletionError, CompletionRequest};
    use pengpt_agent::runtime::{AgentRuntime, DispatchSettings};
    use pengpt_core::conversation::ConversationStore;
    use pengpt_core::cooldown::CooldownGate;
    use pengpt_core::domain::message::Message;
    use pengpt_core::rotation::{Credential, RotationScheduler};
    use secrecy::SecretString;
    use tokio::sync::Mutex;

    use super::{
        BotIdentity, ChatEvent, EventContext, EventHandler, HandlerResult, MessageHandle,
        MessageHandler, Responder, ResponderError,
    };

    #[derive(Default)]
    struct RecordingResponder {
        log: Mutex<Vec<String>>,
    }

    impl RecordingResponder {
        async fn log(&self) -> Vec<String> {
            self.log.lock().await.clone()
        }
    }

    #[async_trait]
    impl Responder for RecordingResponder {
        async fn send(&self, channel_id: &str, text: &str) -> Result<MessageHandle, ResponderError> {
            let mut log = self.log.lock().await;
            let message_id = format!("msg-{}", log.len());
            log.push(format!("send {channel_id}: {text}"));
            Ok(MessageHandle { channel_id: channel_id.to_owned(), message_id })
        }

        async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<(), ResponderError> {
            self.log.lock().await.push(format!("edit {}: {text}", handle.message_id));
            Ok(())
        }
    }

    #[derive(Default)]
    struct ScriptedClient {
        responses: Mutex<VecDeque<String>>,
        contexts: Mutex<Vec<Vec<Message>>>,
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(
            &self,
            request: &CompletionRequest,
            _credential: &Credential,
        ) -> Result<String, CompletionError> {
            self.contexts.lock().await.push(request.messages.clone());
            self.responses.lock().await.pop_front().ok_or(CompletionError::Empty)
        }
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).single().expect("valid timestamp")
    }

    fn event(user_id: &str, text: &str, seconds: i64) -> ChatEvent {
        ChatEvent {
            event_id: format!("evt-{seconds}"),
            user_id: user_id.to_owned(),
            channel_id: "C1".to_owned(),
            text: text.to_owned(),
            received_at: at(seconds),
        }
    }

    fn handler(
        responses: &[&str],
        ping_only: bool,
    ) -> (MessageHandler, Arc<RecordingResponder>, Arc<ScriptedClient>) {
        let client = Arc::new(ScriptedClient {
            responses: Mutex::new(responses.iter().map(|text| (*text).to_owned()).collect()),
            contexts: Mutex::new(Vec::new()),
        });
        let scheduler = RotationScheduler::new(
            vec![SecretString::from("gsk-aaaa".to_string())],
            BTreeMap::from([("fast".to_string(), vec!["m-a".to_string()])]),
            "fast",
            Duration::seconds(40),
        )
        .expect("valid scheduler");
        let runtime = Arc::new(AgentRuntime::new(
            Arc::new(ConversationStore::default()),
            Arc::new(CooldownGate::default()),
            Arc::new(scheduler),
            client.clone(),
            GuardrailPolicy::default(),
            DispatchSettings::default(),
        ));
        let responder = Arc::new(RecordingResponder::default());
        let identity = BotIdentity { user_id: "BOT".to_owned(), mention: "<@BOT>".to_owned() };
        (MessageHandler::new(runtime, responder.clone(), identity, ping_only), responder, client)
    }

    #[tokio::test]
    async fn own_messages_are_ignored_before_anything_else() {
        let (handler, responder, _) = handler(&["unused"], false);
        let result = handler.handle(&event("BOT", "/help", 0), &EventContext::default()).await;

        assert_eq!(result, Ok(HandlerResult::Ignored));
        assert!(responder.log().await.is_empty());
    }

    #[tokio::test]
    async fn prompt_gets_placeholder_then_edited_reply() {
        let (handler, responder, _) = handler(&["hi there"], false);
        let result = handler.handle(&event("U1", "hello", 0), &EventContext::default()).await;

        assert_eq!(result, Ok(HandlerResult::Replied("hi there".to_owned())));
        assert_eq!(
            responder.log().await,
            vec!["send C1: 🤖 Thinking...".to_owned(), "edit msg-0: hi there".to_owned()]
        );
    }

    #[tokio::test]
    async fn ping_only_requires_mention_and_strips_it() {
        let (handler, responder, client) = handler(&["yo"], true);
        let ctx = EventContext::default();

        assert_eq!(handler.handle(&event("U1", "hello", 0), &ctx).await, Ok(HandlerResult::Ignored));
        assert!(responder.log().await.is_empty());

        let result = handler.handle(&event("U1", "<@BOT> hello", 1), &ctx).await;
        assert_eq!(result, Ok(HandlerResult::Replied("yo".to_owned())));
        let contexts = client.contexts.lock().await.clone();
        assert_eq!(contexts[0].last(), Some(&Message::user("hello")));
    }

    #[tokio::test]
    async fn bare_mention_is_ignored() {
        let (handler, responder, _) = handler(&["unused"], true);
        let result = handler.handle(&event("U1", "  <@BOT>  ", 0), &EventContext::default()).await;

        assert_eq!(result, Ok(HandlerResult::Ignored));
        assert!(responder.log().await.is_empty());
    }

    #[tokio::test]
    async fn throttled_prompt_produces_no_output() {
        let (handler, responder, _) = handler(&["first", "second"], false);
        let ctx = EventContext::default();

        handler.handle(&event("U1", "one", 0), &ctx).await.expect("first prompt");
        let result = handler.handle(&event("U1", "two", 4), &ctx).await;

        assert_eq!(result, Ok(HandlerResult::Ignored));
        assert_eq!(responder.log().await.len(), 2);
    }

    #[tokio::test]
    async fn commands_bypass_the_gate_and_never_dispatch() {
        let (handler, responder, client) = handler(&["A-reply"], false);
        let ctx = EventContext::default();

        handler.handle(&event("U1", "hello", 0), &ctx).await.expect("prompt");
        let result = handler.handle(&event("U1", "/pa", 1), &ctx).await;

        assert_eq!(result, Ok(HandlerResult::Acknowledged("✅ Ping-only mode ON.".to_owned())));
        assert!(handler.ping_only());
        assert_eq!(client.contexts.lock().await.len(), 1);
        assert_eq!(responder.log().await.last(), Some(&"send C1: ✅ Ping-only mode ON.".to_owned()));
    }

    #[tokio::test]
    async fn saved_chat_flow_builds_ordered_context() {
        let (handler, _, client) = handler(&["B", "D"], false);
        let ctx = EventContext::default();

        handler.handle(&event("U1", "/sc", 0), &ctx).await.expect("start slot");
        handler.handle(&event("U1", "A", 1), &ctx).await.expect("first prompt");
        handler.handle(&event("U1", "C", 10), &ctx).await.expect("second prompt");

        let contexts = client.contexts.lock().await.clone();
        assert_eq!(
            contexts[1][1..].to_vec(),
            vec![Message::user("A"), Message::assistant("B"), Message::user("C")]
        );
    }
}
