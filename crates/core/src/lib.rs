pub mod config;
pub mod conversation;
pub mod cooldown;
pub mod domain;
pub mod errors;
pub mod rotation;

pub use config::{AppConfig, ConfigError, LoadOptions};
pub use conversation::ConversationStore;
pub use cooldown::CooldownGate;
pub use domain::message::{Message, Role};
pub use domain::slot::SlotId;
pub use errors::{DomainError, UpstreamError};
pub use rotation::{
    Credential, ModelState, RateLimitAction, RotationError, RotationScheduler, SchedulerSnapshot,
};
