//! Dummy LLM provider — echoes input back prefixed with `[echo]`.
//! Used for testing the agent worker's tool-call loop without a real
//! API key or network access.

use crate::llm::{ChatRequest, LlmResponse, ProviderError, StreamRequest};

#[derive(Debug, Clone, Default)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn chat(&self, req: ChatRequest<'_>) -> Result<LlmResponse, ProviderError> {
        let last_user = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == crate::llm::Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("");
        Ok(LlmResponse {
            content: format!("[echo] {last_user}"),
            tool_calls: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: "stop".to_string(),
        })
    }

    pub async fn stream(&self, req: StreamRequest<'_>) -> Result<Vec<String>, ProviderError> {
        let last_user =
            req.messages.iter().rev().find(|m| m.role == crate::llm::Role::User).map(|m| m.content.as_str()).unwrap_or("");
        Ok(format!("[echo] {last_user}").split(' ').map(|w| format!("{w} ")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Message, ToolChoice};

    fn req(messages: &[Message]) -> ChatRequest<'_> {
        ChatRequest {
            messages,
            model: "test-model",
            temperature: 0.0,
            max_output_tokens: 256,
            tools: &[],
            tool_choice: ToolChoice::Auto,
        }
    }

    #[tokio::test]
    async fn echoes_last_user_message() {
        let p = DummyProvider;
        let messages = vec![Message::system("sys"), Message::user("hello")];
        let resp = p.chat(req(&messages)).await.unwrap();
        assert_eq!(resp.content, "[echo] hello");
    }

    #[tokio::test]
    async fn no_user_message_echoes_empty() {
        let p = DummyProvider;
        let messages = vec![Message::system("sys")];
        let resp = p.chat(req(&messages)).await.unwrap();
        assert_eq!(resp.content, "[echo] ");
    }

    #[tokio::test]
    async fn stream_yields_word_chunks() {
        let p = DummyProvider;
        let messages = vec![Message::user("hello there")];
        let stream_req = StreamRequest { messages: &messages, model: "test-model", temperature: 0.0, max_output_tokens: 256 };
        let chunks = p.stream(stream_req).await.unwrap();
        assert_eq!(chunks.join(""), "[echo] hello there ");
    }
}
