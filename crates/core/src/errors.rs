use thiserror::Error;

/// Local, recoverable conditions. These are reported back to the user as a
/// command acknowledgement and never leave the conversation layer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("maximum of {max} saved chats reached")]
    CapacityExceeded { max: usize },
    #[error("no saved chat #{0}")]
    SlotNotFound(u8),
    #[error("unknown model tier `{0}`")]
    UnknownTier(String),
}

impl DomainError {
    pub fn user_message(&self) -> String {
        match self {
            Self::CapacityExceeded { .. } => "❌ Max chats reached".to_owned(),
            Self::SlotNotFound(slot) => format!("❌ No saved chat #{slot}"),
            Self::UnknownTier(tier) => format!("❌ Unknown model tier `{tier}`"),
        }
    }
}

/// Failures of the remote completion service that are shown to the user
/// verbatim instead of being retried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion transport failed: {0}")]
    Transport(String),
    #[error("completion service still rate limited after {attempts} attempts: {detail}")]
    RetriesExhausted { attempts: u32, detail: String },
}

impl UpstreamError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { status, body } => format!("❌ Error {status}: {body}"),
            Self::Transport(detail) => format!("❌ Error: {detail}"),
            Self::RetriesExhausted { attempts, detail } => {
                format!("❌ Error 429: still rate limited after {attempts} attempts ({detail})")
            }
        }
    }
}
