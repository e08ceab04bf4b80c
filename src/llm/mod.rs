//! LLM provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities — clone them freely.
//! Async is delegated to the underlying provider; `chat` is an `async fn`
//! on the enum so callers need no trait-object machinery.

pub mod providers;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("missing API key for provider: {0}")]
    MissingApiKey(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("provider returned an error: {0}")]
    Upstream(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One turn in a conversation, in the provider-agnostic shape every
/// adapter translates to and from its own wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Set on `Role::Tool` messages: which tool call this is a result for.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
    /// Set on `Role::Tool` messages when the provider keys results by name
    /// rather than call id (Google).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into(), tool_call_id: None, name: None }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), tool_call_id: None, name: None }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), tool_call_id: None, name: None }
    }
    pub fn tool_result(name: impl Into<String>, tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    None,
    Required,
}

#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub finish_reason: String,
}

/// Parameters shared by every `chat` call, grouped so adding a field
/// doesn't ripple through every provider's signature.
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub messages: &'a [Message],
    pub model: &'a str,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub tools: &'a [ToolDefinition],
    pub tool_choice: ToolChoice,
}

/// Parameters for a `stream` call. No `tools`/`tool_choice`: streaming is
/// used for plain text generation only (e.g. context compression), never
/// the tool-call loop.
#[derive(Debug, Clone)]
pub struct StreamRequest<'a> {
    pub messages: &'a [Message],
    pub model: &'a str,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    Google(providers::google::GoogleProvider),
    Anthropic(providers::anthropic::AnthropicProvider),
    OpenAi(providers::openai::OpenAiCompatibleProvider),
    OpenRouter(providers::openai::OpenAiCompatibleProvider),
    Xai(providers::openai::OpenAiCompatibleProvider),
}

impl LlmProvider {
    pub async fn chat(&self, req: ChatRequest<'_>) -> Result<LlmResponse, ProviderError> {
        match self {
            Self::Dummy(p) => p.chat(req).await,
            Self::Google(p) => p.chat(req).await,
            Self::Anthropic(p) => p.chat(req).await,
            Self::OpenAi(p) | Self::OpenRouter(p) | Self::Xai(p) => p.chat(req).await,
        }
    }

    /// Stream a plain-text completion as a sequence of text chunks.
    pub async fn stream(&self, req: StreamRequest<'_>) -> Result<Vec<String>, ProviderError> {
        match self {
            Self::Dummy(p) => p.stream(req).await,
            Self::Google(p) => p.stream(req).await,
            Self::Anthropic(p) => p.stream(req).await,
            Self::OpenAi(p) | Self::OpenRouter(p) | Self::Xai(p) => p.stream(req).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_set_role() {
        assert_eq!(Message::user("hi").role, Role::User);
        assert_eq!(Message::system("sys").role, Role::System);
        assert_eq!(Message::assistant("reply").role, Role::Assistant);
    }

    #[test]
    fn tool_result_carries_call_id() {
        let m = Message::tool_result("execute_shell", "call_1", "ok");
        assert_eq!(m.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(m.role, Role::Tool);
    }
}
