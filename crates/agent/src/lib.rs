//! Agent runtime: turns a user prompt into a completion.
//!
//! The runtime pulls context from the shared conversation store, screens the
//! prompt through the guardrail policy, and drives a bounded retry loop over
//! the completion client. Credentials and models come from the rotation
//! scheduler, which is told about every rate limit so the next attempt uses a
//! fresh pair.
//!
//! # Key Types
//!
//! - `AgentRuntime` - dispatch orchestrator (see `runtime` module)
//! - `CompletionClient` - seam over the remote chat-completions service
//! - `GuardrailPolicy` - prompt screening and refusal handling

pub mod guardrails;
pub mod llm;
pub mod runtime;

pub use guardrails::{GuardrailDecision, GuardrailPolicy};
pub use llm::{CompletionClient, CompletionError, CompletionRequest, OpenAiCompatibleClient};
pub use runtime::{AgentRuntime, DispatchOutcome, DispatchSettings, MAX_DISPATCH_RETRIES};
