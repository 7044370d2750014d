use pengpt_core::config::GuardrailConfig;

pub const SAFETY_REJECTION_REPLY: &str =
    "🚫 I can't help with that. Please take a short break before asking again.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String },
}

impl GuardrailDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Prompt screening applied before any credential is spent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuardrailPolicy {
    blocked_terms: Vec<String>,
}

impl GuardrailPolicy {
    pub fn new<I, S>(blocked_terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let blocked_terms = blocked_terms
            .into_iter()
            .map(|term| term.as_ref().trim().to_lowercase())
            .filter(|term| !term.is_empty())
            .collect();
        Self { blocked_terms }
    }

    pub fn from_config(config: &GuardrailConfig) -> Self {
        Self::new(&config.blocked_terms)
    }

    pub fn evaluate(&self, prompt: &str) -> GuardrailDecision {
        let normalized = prompt.to_lowercase();
        if self.blocked_terms.iter().any(|term| normalized.contains(term.as_str())) {
            return GuardrailDecision::Deny {
                reason_code: "blocked_term",
                user_message: SAFETY_REJECTION_REPLY.to_string(),
            };
        }
        GuardrailDecision::Allow
    }

    /// Decision for a refusal reported by the completion service itself.
    pub fn upstream_refusal(&self) -> GuardrailDecision {
        GuardrailDecision::Deny {
            reason_code: "upstream_content_policy",
            user_message: SAFETY_REJECTION_REPLY.to_string(),
        }
    }
}
