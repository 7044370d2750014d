use std::time::Duration;

use async_trait::async_trait;
use pengpt_core::domain::message::Message;
use pengpt_core::rotation::Credential;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const NO_CONTENT_REPLY: &str = "❌ No content returned.";

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("content rejected by upstream safety policy: {0}")]
    SafetyRejected(String),
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("could not decode completion response: {0}")]
    Decode(String),
    #[error("completion response carried no content")]
    Empty,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest,
        credential: &Credential,
    ) -> Result<String, CompletionError>;
}

/// Client for any `/chat/completions` endpoint speaking the OpenAI wire format.
#[derive(Clone, Debug)]
pub struct OpenAiCompatibleClient {
    http: Client,
    endpoint: String,
}

impl OpenAiCompatibleClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, CompletionError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| CompletionError::Transport(error.to_string()))?;
        Ok(Self { http, endpoint: endpoint.into() })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

fn is_safety_code(code: &str) -> bool {
    matches!(code, "content_filter" | "content_policy_violation")
}

/// Maps a non-success response onto the error taxonomy. Rate limits and
/// content-policy refusals are recognised ahead of the generic status case.
fn classify_failure(status: StatusCode, body: String) -> CompletionError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(&body).ok();
    let detail = envelope
        .as_ref()
        .and_then(|envelope| envelope.error.message.clone())
        .unwrap_or_else(|| body.clone());

    if status == StatusCode::TOO_MANY_REQUESTS {
        return CompletionError::RateLimited(detail);
    }
    if envelope
        .as_ref()
        .and_then(|envelope| envelope.error.code.as_deref())
        .is_some_and(is_safety_code)
    {
        return CompletionError::SafetyRejected(detail);
    }
    CompletionError::Status { status: status.as_u16(), body }
}

fn extract_content(response: ChatResponse) -> Result<String, CompletionError> {
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(CompletionError::Empty);
    };

    if choice.finish_reason.as_deref().is_some_and(is_safety_code) {
        return Err(CompletionError::SafetyRejected(
            "completion stopped by content filter".to_string(),
        ));
    }

    match choice.message.and_then(|message| message.content) {
        Some(content) if !content.trim().is_empty() => Ok(content),
        _ => Err(CompletionError::Empty),
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatibleClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
        credential: &Credential,
    ) -> Result<String, CompletionError> {
        let body = ChatRequest {
            model: &request.model,
            messages: request
                .messages
                .iter()
                .map(|message| WireMessage { role: message.role().as_str(), content: message.text() })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(credential.secret().expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| CompletionError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|error| CompletionError::Transport(error.to_string()))?;
            return Err(classify_failure(status, text));
        }

        let parsed = response
            .json::<ChatResponse>()
            .await
            .map_err(|error| CompletionError::Decode(error.to_string()))?;
        extract_content(parsed)
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::{classify_failure, extract_content, ChatResponse, CompletionError};

    fn parse(raw: &str) -> ChatResponse {
        serde_json::from_str(raw).expect("valid response fixture")
    }

    #[test]
    fn too_many_requests_is_rate_limited() {
        let error = classify_failure(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"Rate limit reached for model"}}"#.to_string(),
        );
        assert_eq!(error, CompletionError::RateLimited("Rate limit reached for model".to_string()));
    }

    #[test]
    fn content_policy_code_is_safety_rejection() {
        let error = classify_failure(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"nope","code":"content_policy_violation"}}"#.to_string(),
        );
        assert!(matches!(error, CompletionError::SafetyRejected(_)));
    }

    #[test]
    fn other_failures_keep_status_and_raw_body() {
        let error = classify_failure(StatusCode::INTERNAL_SERVER_ERROR, "upstream down".to_string());
        assert_eq!(
            error,
            CompletionError::Status { status: 500, body: "upstream down".to_string() }
        );
    }

    #[test]
    fn first_choice_content_is_returned() {
        let response = parse(
            r#"{"choices":[{"message":{"role":"assistant","content":"hi there"},"finish_reason":"stop"}]}"#,
        );
        assert_eq!(extract_content(response), Ok("hi there".to_string()));
    }

    #[test]
    fn missing_content_is_reported_as_empty() {
        assert_eq!(extract_content(parse(r#"{"choices":[]}"#)), Err(CompletionError::Empty));
        assert_eq!(
            extract_content(parse(r#"{"choices":[{"message":{"content":null}}]}"#)),
            Err(CompletionError::Empty)
        );
    }

    #[test]
    fn content_filter_finish_reason_is_safety_rejection() {
        let response = parse(r#"{"choices":[{"message":{"content":""},"finish_reason":"content_filter"}]}"#);
        assert!(matches!(extract_content(response), Err(CompletionError::SafetyRejected(_))));
    }
}
