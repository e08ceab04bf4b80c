//! Anthropic Messages API provider.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};

use crate::llm::{ChatRequest, LlmResponse, Message, ProviderError, Role, StreamRequest, ToolCall, ToolChoice, ToolDefinition};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: String, timeout_seconds: u64) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(Duration::from_secs(timeout_seconds)).build()?;
        Ok(Self { client, api_key, base_url })
    }

    fn build_tools(tools: &[ToolDefinition]) -> Option<Value> {
        if tools.is_empty() {
            return None;
        }
        Some(Value::Array(
            tools
                .iter()
                .map(|t| json!({ "name": t.name, "description": t.description, "input_schema": t.parameters }))
                .collect(),
        ))
    }

    /// Lift the system message out and turn `tool`-role turns into
    /// user-turn `tool_result` content blocks, since Anthropic has no
    /// dedicated tool role.
    fn extract_messages(messages: &[Message]) -> (Option<String>, Vec<Value>) {
        let mut system_prompt = None;
        let mut conversation = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_prompt = Some(msg.content.clone()),
                Role::Tool => conversation.push(json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                        "content": msg.content,
                    }]
                })),
                Role::User => conversation.push(json!({ "role": "user", "content": msg.content })),
                Role::Assistant => conversation.push(json!({ "role": "assistant", "content": msg.content })),
            }
        }

        (system_prompt, conversation)
    }

    pub async fn chat(&self, req: ChatRequest<'_>) -> Result<LlmResponse, ProviderError> {
        let (system_prompt, conversation) = Self::extract_messages(req.messages);

        let mut body = json!({
            "model": req.model,
            "messages": conversation,
            "max_tokens": req.max_output_tokens,
            "temperature": req.temperature,
        });
        if let Some(system) = system_prompt {
            body["system"] = json!(system);
        }

        if req.tool_choice != ToolChoice::None
            && let Some(tools) = Self::build_tools(req.tools)
        {
            body["tools"] = tools;
            body["tool_choice"] = match req.tool_choice {
                ToolChoice::Required => json!({ "type": "any" }),
                _ => json!({ "type": "auto" }),
            };
        }

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream(format!("HTTP {status}: {text}")));
        }

        let payload: Value = response.json().await?;
        let blocks = payload
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| ProviderError::MalformedResponse("missing content".to_string()))?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in blocks {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                        content.push_str(text);
                    }
                }
                Some("tool_use") => {
                    let id = block.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                    let name = block.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                    let arguments = block.get("input").cloned().unwrap_or_else(|| json!({}));
                    tool_calls.push(ToolCall { id, name, arguments });
                }
                _ => {}
            }
        }

        let finish_reason = payload.get("stop_reason").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let usage = payload.get("usage");
        let input_tokens = usage.and_then(|u| u.get("input_tokens")).and_then(|v| v.as_u64()).unwrap_or(0);
        let output_tokens = usage.and_then(|u| u.get("output_tokens")).and_then(|v| v.as_u64()).unwrap_or(0);

        Ok(LlmResponse { content, tool_calls, input_tokens, output_tokens, finish_reason })
    }

    pub async fn stream(&self, req: StreamRequest<'_>) -> Result<Vec<String>, ProviderError> {
        let (system_prompt, conversation) = Self::extract_messages(req.messages);

        let mut body = json!({
            "model": req.model,
            "messages": conversation,
            "max_tokens": req.max_output_tokens,
            "temperature": req.temperature,
            "stream": true,
        });
        if let Some(system) = system_prompt {
            body["system"] = json!(system);
        }

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream(format!("HTTP {status}: {text}")));
        }

        super::collect_sse_chunks(response, |data| {
            let payload: Value = serde_json::from_str(data).ok()?;
            if payload.get("type")?.as_str()? != "content_block_delta" {
                return None;
            }
            payload.get("delta")?.get("text")?.as_str().map(str::to_string)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_messages_lifts_system_prompt() {
        let messages = vec![Message::system("be nice"), Message::user("hi")];
        let (system, conv) = AnthropicProvider::extract_messages(&messages);
        assert_eq!(system, Some("be nice".to_string()));
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn extract_messages_converts_tool_turn() {
        let messages = vec![Message::tool_result("execute_shell", "call_1", "ok")];
        let (_, conv) = AnthropicProvider::extract_messages(&messages);
        assert_eq!(conv[0]["role"], "user");
        assert_eq!(conv[0]["content"][0]["type"], "tool_result");
        assert_eq!(conv[0]["content"][0]["tool_use_id"], "call_1");
    }

    #[test]
    fn build_tools_uses_input_schema_key() {
        let tools = vec![ToolDefinition {
            name: "read_memory".to_string(),
            description: "read memory".to_string(),
            parameters: json!({"type": "object"}),
        }];
        let built = AnthropicProvider::build_tools(&tools).unwrap();
        assert_eq!(built[0]["input_schema"]["type"], "object");
    }
}
