use std::env;
use std::fs;
use std::path::Path;

use pengpt_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct FieldSource<'a> {
    doc: Option<&'a Value>,
    path: Option<&'a Path>,
}

impl FieldSource<'_> {
    fn describe(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if self.doc.is_some_and(|doc| contains_path(doc, key_path)) {
            let file = self
                .path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file})");
        }

        "default".to_string()
    }
}

struct RenderedField {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

fn field(key: &'static str, env_keys: &'static [&'static str], value: String) -> RenderedField {
    RenderedField { key, env_keys, value }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let path = resolve_config_path(None);
    let doc = load_config_file_doc(path.as_deref());
    let source = FieldSource { doc: doc.as_ref(), path: path.as_deref() };

    render(&config, &source)
}

fn render(config: &AppConfig, source: &FieldSource<'_>) -> String {
    let tiers = config
        .llm
        .tiers
        .iter()
        .map(|(name, models)| format!("{name}=[{}]", models.join(", ")))
        .collect::<Vec<_>>()
        .join("; ");

    let fields = vec![
        field("chat.bot_user_id", &["PENGPT_CHAT_BOT_USER_ID"], config.chat.bot_user_id.clone()),
        field("chat.bot_mention", &["PENGPT_CHAT_BOT_MENTION"], config.chat.mention()),
        field("chat.transport", &["PENGPT_CHAT_TRANSPORT"], format!("{:?}", config.chat.transport)),
        field("chat.ping_only", &["PENGPT_CHAT_PING_ONLY"], config.chat.ping_only.to_string()),
        field("llm.base_url", &["PENGPT_LLM_BASE_URL"], config.llm.base_url.clone()),
        field(
            "llm.api_keys",
            &["PENGPT_LLM_API_KEYS", "GROQ_API_KEY"],
            redact_keys(&config.llm.api_keys),
        ),
        field("llm.tiers", &[], tiers),
        field("llm.default_tier", &["PENGPT_LLM_DEFAULT_TIER"], config.llm.default_tier.clone()),
        field("llm.temperature", &[], config.llm.temperature.to_string()),
        field("llm.max_tokens", &[], config.llm.max_tokens.to_string()),
        field("llm.timeout_secs", &["PENGPT_LLM_TIMEOUT_SECS"], config.llm.timeout_secs.to_string()),
        field("llm.max_attempts", &["PENGPT_LLM_MAX_ATTEMPTS"], config.llm.max_attempts.to_string()),
        field("conversation.max_memory", &[], config.conversation.max_memory.to_string()),
        field(
            "conversation.user_cooldown_secs",
            &["PENGPT_CONVERSATION_USER_COOLDOWN_SECS"],
            config.conversation.user_cooldown_secs.to_string(),
        ),
        field(
            "conversation.model_cooldown_secs",
            &["PENGPT_CONVERSATION_MODEL_COOLDOWN_SECS"],
            config.conversation.model_cooldown_secs.to_string(),
        ),
        field(
            "conversation.safety_cooldown_secs",
            &[],
            config.conversation.safety_cooldown_secs.to_string(),
        ),
        field("persona.utc_offset_hours", &[], config.persona.utc_offset_hours.to_string()),
        field("guardrails.blocked_terms", &[], format!("{} term(s)", config.guardrails.blocked_terms.len())),
        field("server.bind_address", &["PENGPT_SERVER_BIND_ADDRESS"], config.server.bind_address.clone()),
        field(
            "server.health_check_port",
            &["PENGPT_SERVER_HEALTH_CHECK_PORT", "PORT"],
            config.server.health_check_port.to_string(),
        ),
        field(
            "logging.level",
            &["PENGPT_LOGGING_LEVEL", "PENGPT_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        field(
            "logging.format",
            &["PENGPT_LOGGING_FORMAT", "PENGPT_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields.into_iter().map(|field| {
        format!(
            "- {} = {} (source: {})",
            field.key,
            field.value,
            source.describe(field.key, field.env_keys)
        )
    }));
    lines.join("\n")
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keys render as `gsk-***` style prefixes with their last four characters.
fn redact_keys(keys: &[SecretString]) -> String {
    let rendered = keys.iter().map(|key| redact_key(key.expose_secret())).collect::<Vec<_>>();
    format!("{} key(s) [{}]", keys.len(), rendered.join(", "))
}

fn redact_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if trimmed.chars().count() < 8 {
        return "<redacted>".to_string();
    }

    let tail: String = trimmed.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    match trimmed.split_once(&['-', '_'][..]) {
        Some((prefix, _)) => format!("{prefix}-***{tail}"),
        None => format!("***{tail}"),
    }
}
