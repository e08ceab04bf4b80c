//! Google Gemini `generateContent` REST provider.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};

use crate::llm::{ChatRequest, LlmResponse, Message, ProviderError, Role, StreamRequest, ToolCall, ToolDefinition};

#[derive(Debug, Clone)]
pub struct GoogleProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GoogleProvider {
    pub fn new(api_key: String, base_url: String, timeout_seconds: u64) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(Duration::from_secs(timeout_seconds)).build()?;
        Ok(Self { client, api_key, base_url })
    }

    fn build_tools(tools: &[ToolDefinition]) -> Option<Value> {
        if tools.is_empty() {
            return None;
        }
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| json!({ "name": t.name, "description": t.description, "parameters": t.parameters }))
            .collect();
        Some(json!([{ "functionDeclarations": declarations }]))
    }

    /// System messages are pulled out to `systemInstruction`; `assistant`
    /// becomes Gemini's `model` role; tool turns become function-response
    /// parts keyed by tool name (Gemini has no call-id correlation).
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<Value>) {
        let mut system_instruction = None;
        let mut contents = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_instruction = Some(msg.content.clone()),
                Role::User => contents.push(json!({ "role": "user", "parts": [{ "text": msg.content }] })),
                Role::Assistant => contents.push(json!({ "role": "model", "parts": [{ "text": msg.content }] })),
                Role::Tool => {
                    let name = msg.name.clone().unwrap_or_else(|| "tool".to_string());
                    contents.push(json!({
                        "role": "user",
                        "parts": [{ "functionResponse": { "name": name, "response": { "result": msg.content } } }]
                    }));
                }
            }
        }

        (system_instruction, contents)
    }

    pub async fn chat(&self, req: ChatRequest<'_>) -> Result<LlmResponse, ProviderError> {
        let (system_instruction, contents) = Self::convert_messages(req.messages);

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": req.temperature,
                "maxOutputTokens": req.max_output_tokens,
            }
        });
        if let Some(system) = system_instruction {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        if let Some(tools) = Self::build_tools(req.tools) {
            body["tools"] = tools;
        }

        let url = format!("{}/models/{}:generateContent?key={}", self.base_url, req.model, self.api_key);
        let response = self.client.post(url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream(format!("HTTP {status}: {text}")));
        }

        let payload: Value = response.json().await?;
        let candidate = payload
            .get("candidates")
            .and_then(|c| c.get(0))
            .ok_or_else(|| ProviderError::MalformedResponse("missing candidates[0]".to_string()))?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        if let Some(parts) = candidate.get("content").and_then(|c| c.get("parts")).and_then(|p| p.as_array()) {
            for part in parts {
                if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                    content.push_str(text);
                } else if let Some(fc) = part.get("functionCall") {
                    let name = fc.get("name").and_then(|n| n.as_str()).unwrap_or_default().to_string();
                    let arguments = fc.get("args").cloned().unwrap_or_else(|| json!({}));
                    tool_calls.push(ToolCall { id: name.clone(), name, arguments });
                }
            }
        }

        let finish_reason = candidate.get("finishReason").and_then(|f| f.as_str()).unwrap_or("").to_string();
        let usage = payload.get("usageMetadata");
        let input_tokens = usage.and_then(|u| u.get("promptTokenCount")).and_then(|v| v.as_u64()).unwrap_or(0);
        let output_tokens = usage.and_then(|u| u.get("candidatesTokenCount")).and_then(|v| v.as_u64()).unwrap_or(0);

        Ok(LlmResponse { content, tool_calls, input_tokens, output_tokens, finish_reason })
    }

    pub async fn stream(&self, req: StreamRequest<'_>) -> Result<Vec<String>, ProviderError> {
        let (system_instruction, contents) = Self::convert_messages(req.messages);

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": req.temperature,
                "maxOutputTokens": req.max_output_tokens,
            }
        });
        if let Some(system) = system_instruction {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        let url = format!("{}/models/{}:streamGenerateContent?alt=sse&key={}", self.base_url, req.model, self.api_key);
        let response = self.client.post(url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream(format!("HTTP {status}: {text}")));
        }

        super::collect_sse_chunks(response, |data| {
            let payload: Value = serde_json::from_str(data).ok()?;
            payload.get("candidates")?.get(0)?.get("content")?.get("parts")?.get(0)?.get("text")?.as_str().map(str::to_string)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_messages_renames_assistant_to_model() {
        let messages = vec![Message::assistant("hi")];
        let (_, contents) = GoogleProvider::convert_messages(&messages);
        assert_eq!(contents[0]["role"], "model");
    }

    #[test]
    fn convert_messages_extracts_system_instruction() {
        let messages = vec![Message::system("be terse")];
        let (system, contents) = GoogleProvider::convert_messages(&messages);
        assert_eq!(system, Some("be terse".to_string()));
        assert!(contents.is_empty());
    }

    #[test]
    fn convert_messages_turns_tool_result_into_function_response() {
        let messages = vec![Message::tool_result("read_memory", "call_1", "memory contents")];
        let (_, contents) = GoogleProvider::convert_messages(&messages);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["functionResponse"]["name"], "read_memory");
    }

    #[test]
    fn build_tools_wraps_function_declarations() {
        let tools =
            vec![ToolDefinition { name: "read_tasks".to_string(), description: "list tasks".to_string(), parameters: json!({}) }];
        let built = GoogleProvider::build_tools(&tools).unwrap();
        assert_eq!(built[0]["functionDeclarations"][0]["name"], "read_tasks");
    }
}
