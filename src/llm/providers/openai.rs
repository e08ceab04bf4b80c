//! OpenAI-compatible chat completions provider.
//!
//! Also backs OpenRouter and xAI, both of which mirror OpenAI's
//! `/chat/completions` wire format behind a different `base_url`.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};

use crate::llm::{ChatRequest, LlmResponse, ProviderError, Role, StreamRequest, ToolCall, ToolChoice};

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(api_key: String, base_url: String, timeout_seconds: u64) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(Duration::from_secs(timeout_seconds)).build()?;
        Ok(Self { client, api_key, base_url })
    }

    fn build_tools(tools: &[crate::llm::ToolDefinition]) -> Option<Value> {
        if tools.is_empty() {
            return None;
        }
        Some(Value::Array(
            tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect(),
        ))
    }

    fn role_str(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    pub async fn chat(&self, req: ChatRequest<'_>) -> Result<LlmResponse, ProviderError> {
        let messages: Vec<Value> = req
            .messages
            .iter()
            .map(|m| {
                let mut obj = json!({ "role": Self::role_str(m.role), "content": m.content });
                if let Some(tool_call_id) = &m.tool_call_id {
                    obj["tool_call_id"] = json!(tool_call_id);
                }
                obj
            })
            .collect();

        let mut body = json!({
            "model": req.model,
            "messages": messages,
            "temperature": req.temperature,
            "max_tokens": req.max_output_tokens,
        });

        if let Some(tools) = Self::build_tools(req.tools) {
            body["tools"] = tools;
            body["tool_choice"] = match req.tool_choice {
                ToolChoice::Auto => json!("auto"),
                ToolChoice::None => json!("none"),
                ToolChoice::Required => json!("required"),
            };
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream(format!("HTTP {status}: {text}")));
        }

        let payload: Value = response.json().await?;
        let choice = payload
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| ProviderError::MalformedResponse("missing choices[0]".to_string()))?;
        let message = choice.get("message").ok_or_else(|| ProviderError::MalformedResponse("missing message".to_string()))?;

        let content = message.get("content").and_then(|c| c.as_str()).unwrap_or("").to_string();
        let finish_reason = choice.get("finish_reason").and_then(|f| f.as_str()).unwrap_or("").to_string();

        let tool_calls = message
            .get("tool_calls")
            .and_then(|tc| tc.as_array())
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|call| {
                        let id = call.get("id")?.as_str()?.to_string();
                        let function = call.get("function")?;
                        let name = function.get("name")?.as_str()?.to_string();
                        let raw_args = function.get("arguments").and_then(|a| a.as_str()).unwrap_or("{}");
                        let arguments = serde_json::from_str(raw_args)
                            .unwrap_or_else(|_| json!({ "raw": raw_args }));
                        Some(ToolCall { id, name, arguments })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let usage = payload.get("usage");
        let input_tokens = usage.and_then(|u| u.get("prompt_tokens")).and_then(|v| v.as_u64()).unwrap_or(0);
        let output_tokens = usage.and_then(|u| u.get("completion_tokens")).and_then(|v| v.as_u64()).unwrap_or(0);

        Ok(LlmResponse { content, tool_calls, input_tokens, output_tokens, finish_reason })
    }

    pub async fn stream(&self, req: StreamRequest<'_>) -> Result<Vec<String>, ProviderError> {
        let messages: Vec<Value> = req
            .messages
            .iter()
            .map(|m| json!({ "role": Self::role_str(m.role), "content": m.content }))
            .collect();

        let body = json!({
            "model": req.model,
            "messages": messages,
            "temperature": req.temperature,
            "max_tokens": req.max_output_tokens,
            "stream": true,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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
            payload.get("choices")?.get(0)?.get("delta")?.get("content")?.as_str().map(str::to_string)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_tools_returns_none_when_empty() {
        assert!(OpenAiCompatibleProvider::build_tools(&[]).is_none());
    }

    #[test]
    fn build_tools_wraps_function_schema() {
        let tools = vec![crate::llm::ToolDefinition {
            name: "execute_shell".to_string(),
            description: "run a shell command".to_string(),
            parameters: json!({"type": "object"}),
        }];
        let built = OpenAiCompatibleProvider::build_tools(&tools).unwrap();
        assert_eq!(built[0]["function"]["name"], "execute_shell");
        assert_eq!(built[0]["type"], "function");
    }

    #[test]
    fn role_str_maps_each_variant() {
        assert_eq!(OpenAiCompatibleProvider::role_str(Role::System), "system");
        assert_eq!(OpenAiCompatibleProvider::role_str(Role::Tool), "tool");
    }
}
