use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use pengpt_core::config::AppConfig;
use pengpt_core::conversation::ConversationStore;
use pengpt_core::cooldown::CooldownGate;
use pengpt_core::domain::message::Message;
use pengpt_core::errors::UpstreamError;
use pengpt_core::rotation::RotationScheduler;
use tracing::{info, warn};

use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::llm::{CompletionClient, CompletionError, CompletionRequest, NO_CONTENT_REPLY};

pub const MAX_DISPATCH_RETRIES: u32 = 3;

#[derive(Clone, Debug)]
pub struct DispatchSettings {
    pub instructions: String,
    pub utc_offset: FixedOffset,
    pub temperature: f64,
    pub max_tokens: u32,
    pub max_attempts: u32,
    pub safety_cooldown: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            instructions: String::new(),
            utc_offset: Utc.fix(),
            temperature: 0.7,
            max_tokens: 1024,
            max_attempts: MAX_DISPATCH_RETRIES,
            safety_cooldown: Duration::seconds(60),
        }
    }
}

impl DispatchSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let utc_offset = FixedOffset::east_opt(config.persona.utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix());
        Self {
            instructions: config.persona.instructions.clone(),
            utc_offset,
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            max_attempts: config.llm.max_attempts.max(1),
            safety_cooldown: config.conversation.safety_cooldown(),
        }
    }

    pub fn system_message(&self, now: DateTime<Utc>) -> Message {
        let today = now.with_timezone(&self.utc_offset).format("%Y-%m-%d");
        let instructions = self.instructions.trim();
        if instructions.is_empty() {
            Message::system(format!("Today's date: {today}."))
        } else {
            Message::system(format!("Today's date: {today}. {instructions}"))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The cooldown gate dropped the message; nothing is sent back.
    Throttled,
    Reply(String),
    Rejected(String),
    Failed(UpstreamError),
}

impl DispatchOutcome {
    pub fn reply_text(&self) -> Option<String> {
        match self {
            Self::Throttled => None,
            Self::Reply(text) | Self::Rejected(text) => Some(text.clone()),
            Self::Failed(error) => Some(error.user_message()),
        }
    }
}

/// Orchestrates one prompt end to end over the shared conversation state.
///
/// Context is read and the exchange recorded in two separate short critical
/// sections; no lock is held across the completion call.
pub struct AgentRuntime {
    store: Arc<ConversationStore>,
    gate: Arc<CooldownGate>,
    scheduler: Arc<RotationScheduler>,
    client: Arc<dyn CompletionClient>,
    guardrails: GuardrailPolicy,
    settings: DispatchSettings,
}

impl AgentRuntime {
    pub fn new(
        store: Arc<ConversationStore>,
        gate: Arc<CooldownGate>,
        scheduler: Arc<RotationScheduler>,
        client: Arc<dyn CompletionClient>,
        guardrails: GuardrailPolicy,
        settings: DispatchSettings,
    ) -> Self {
        Self { store, gate, scheduler, client, guardrails, settings }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn gate(&self) -> &CooldownGate {
        &self.gate
    }

    pub fn scheduler(&self) -> &RotationScheduler {
        &self.scheduler
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn admit(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        self.gate.admit(user_id, now)
    }

    pub async fn dispatch(&self, user_id: &str, prompt: &str, now: DateTime<Utc>) -> DispatchOutcome {
        if !self.admit(user_id, now) {
            return DispatchOutcome::Throttled;
        }
        self.respond(user_id, prompt, now).await
    }

    /// Runs an already-admitted prompt through the bounded retry loop.
    pub async fn respond(&self, user_id: &str, prompt: &str, now: DateTime<Utc>) -> DispatchOutcome {
        if let GuardrailDecision::Deny { reason_code, user_message } = self.guardrails.evaluate(prompt)
        {
            self.suspend_user(user_id, now, reason_code);
            return DispatchOutcome::Rejected(user_message);
        }

        let mut messages = Vec::new();
        messages.push(self.settings.system_message(now));
        messages.extend(self.store.build_context(prompt));

        let max_attempts = self.settings.max_attempts.max(1);
        let mut last_detail = String::new();

        for attempt in 1..=max_attempts {
            let credential = self.scheduler.current_credential();
            let model = self.scheduler.select_model(now);
            info!(
                event_name = "dispatch.attempt",
                user_id,
                attempt,
                model = %model,
                credential = %credential.fingerprint(),
                context_len = messages.len(),
                "dispatching completion request"
            );

            let request = CompletionRequest {
                model,
                messages: messages.clone(),
                temperature: self.settings.temperature,
                max_tokens: self.settings.max_tokens,
            };

            match self.client.complete(&request, &credential).await {
                Ok(text) => {
                    self.store.record_exchange(prompt, &text);
                    info!(event_name = "dispatch.completed", user_id, attempt, "completion recorded");
                    return DispatchOutcome::Reply(text);
                }
                Err(CompletionError::RateLimited(detail)) => {
                    let action = self.scheduler.on_rate_limited(&request.model, now);
                    warn!(
                        event_name = "dispatch.rate_limited",
                        user_id,
                        attempt,
                        model = %request.model,
                        next_credential = action.credential_position,
                        penalized_model = action.penalized_model.as_deref().unwrap_or("none"),
                        "rate limited; rotating"
                    );
                    last_detail = detail;
                }
                Err(CompletionError::SafetyRejected(detail)) => {
                    warn!(event_name = "dispatch.safety_rejected", user_id, detail = %detail);
                    let decision = self.guardrails.upstream_refusal();
                    return match decision {
                        GuardrailDecision::Deny { reason_code, user_message } => {
                            self.suspend_user(user_id, now, reason_code);
                            DispatchOutcome::Rejected(user_message)
                        }
                        GuardrailDecision::Allow => DispatchOutcome::Reply(NO_CONTENT_REPLY.to_string()),
                    };
                }
                Err(CompletionError::Empty) => {
                    warn!(event_name = "dispatch.empty_completion", user_id, attempt);
                    return DispatchOutcome::Reply(NO_CONTENT_REPLY.to_string());
                }
                Err(CompletionError::Status { status, body }) => {
                    warn!(event_name = "dispatch.upstream_status", user_id, status, "upstream error");
                    return DispatchOutcome::Failed(UpstreamError::Status { status, body });
                }
                Err(CompletionError::Transport(detail)) | Err(CompletionError::Decode(detail)) => {
                    warn!(event_name = "dispatch.transport_failed", user_id, detail = %detail);
                    return DispatchOutcome::Failed(UpstreamError::Transport(detail));
                }
            }
        }

        warn!(event_name = "dispatch.retries_exhausted", user_id, attempts = max_attempts);
        DispatchOutcome::Failed(UpstreamError::RetriesExhausted {
            attempts: max_attempts,
            detail: last_detail,
        })
    }

    fn suspend_user(&self, user_id: &str, now: DateTime<Utc>, reason_code: &str) {
        let until = now + self.settings.safety_cooldown;
        self.gate.suspend(user_id, until);
        warn!(
            event_name = "dispatch.user_suspended",
            user_id,
            reason_code,
            until = %until,
            "dispatch suspended after safety rejection"
        );
    }
}
