//! Context manager: conversation history with automatic compression once
//! the estimated token count crosses a configured threshold.

use serde::{Deserialize, Serialize};

use crate::config::ContextConfig;
use crate::llm::{ChatRequest, LlmProvider, Message, Role, ToolChoice};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextStats {
    pub message_count: usize,
    pub estimated_tokens: u64,
    pub max_tokens: u64,
    pub usage_ratio: f64,
    pub compression_count: u64,
    pub needs_compression: bool,
}

pub struct ContextManager {
    config: ContextConfig,
    system_prompt: String,
    messages: Vec<Message>,
    estimated_tokens: u64,
    compression_count: u64,
}

impl ContextManager {
    pub fn new(config: ContextConfig) -> Self {
        Self { config, system_prompt: String::new(), messages: Vec::new(), estimated_tokens: 0, compression_count: 0 }
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
    }

    pub fn add_message(&mut self, message: Message) {
        self.estimated_tokens += estimate_tokens(&message.content);
        self.messages.push(message);
    }

    /// Full message list ready for an LLM call, system prompt first.
    pub fn messages(&self) -> Vec<Message> {
        let mut result = Vec::with_capacity(self.messages.len() + 1);
        if !self.system_prompt.is_empty() {
            result.push(Message::system(self.system_prompt.clone()));
        }
        result.extend(self.messages.iter().cloned());
        result
    }

    pub fn needs_compression(&self) -> bool {
        let threshold = (self.config.max_tokens as f64 * self.config.compress_threshold_ratio) as u64;
        self.estimated_tokens >= threshold
    }

    /// Summarize the older half of the conversation via an LLM call,
    /// replacing it with a synthetic system-role summary turn. No-op if
    /// compression isn't needed or there aren't enough messages to split.
    pub async fn compress(&mut self, provider: &LlmProvider) -> bool {
        if !self.needs_compression() || self.messages.len() < 4 {
            return false;
        }

        let split_point = self.messages.len() / 2;
        let old_messages = &self.messages[..split_point];
        let recent_messages: Vec<Message> = self.messages[split_point..].to_vec();

        let mut summary_prompt = String::from(
            "Summarize the following conversation concisely, preserving key facts, \
             decisions, and context that would be needed to continue the conversation. \
             Focus on: user requests, important results, pending items, and any commitments made.\n\n",
        );
        for msg in old_messages {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };
            let snippet: String = msg.content.chars().take(500).collect();
            summary_prompt.push_str(&format!("**{role}**: {snippet}\n\n"));
        }

        let summary_request = [Message::user(summary_prompt)];
        let chat_req = ChatRequest {
            messages: &summary_request,
            model: &self.config.compress_model,
            temperature: 0.3,
            max_output_tokens: 2000,
            tools: &[],
            tool_choice: ToolChoice::None,
        };

        let Ok(response) = provider.chat(chat_req).await else {
            tracing::warn!("context compression failed: provider request errored");
            return false;
        };

        if response.content.is_empty() {
            return false;
        }

        let summary_message = Message::system(format!("[Compressed context summary]\n{}", response.content));
        self.estimated_tokens = estimate_tokens(&response.content)
            + recent_messages.iter().map(|m| estimate_tokens(&m.content)).sum::<u64>();

        self.messages = std::iter::once(summary_message).chain(recent_messages).collect();
        self.compression_count += 1;
        tracing::info!(
            compression_count = self.compression_count,
            old_messages = old_messages.len(),
            "context compressed"
        );
        true
    }

    pub fn reset(&mut self) {
        self.messages.clear();
        self.estimated_tokens = 0;
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            message_count: self.messages.len(),
            estimated_tokens: self.estimated_tokens,
            max_tokens: self.config.max_tokens,
            usage_ratio: if self.config.max_tokens > 0 {
                self.estimated_tokens as f64 / self.config.max_tokens as f64
            } else {
                0.0
            },
            compression_count: self.compression_count,
            needs_compression: self.needs_compression(),
        }
    }
}

/// Rough token estimate: ~1 token per 4 ASCII chars, ~1 per 2 non-ASCII
/// chars (CJK and similar run denser per token), plus a constant for
/// tokenizer overhead on short strings.
fn estimate_tokens(text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }
    let ascii_chars = text.chars().filter(|c| (*c as u32) < 128).count() as u64;
    let non_ascii = text.chars().count() as u64 - ascii_chars;
    (ascii_chars / 4) + (non_ascii / 2) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ContextConfig {
        ContextConfig {
            max_tokens: 1000,
            compress_threshold_ratio: 0.7,
            compress_target_ratio: 0.3,
            compress_model: "test-model".to_string(),
        }
    }

    #[test]
    fn estimate_tokens_ascii() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 2); // 4/4 + 0/2 + 1
    }

    #[test]
    fn estimate_tokens_non_ascii() {
        let estimate = estimate_tokens("日本語");
        assert!(estimate > 1);
    }

    #[test]
    fn add_message_accumulates_estimate() {
        let mut ctx = ContextManager::new(test_config());
        ctx.add_message(Message::user("hello world"));
        assert!(ctx.stats().estimated_tokens > 0);
        assert_eq!(ctx.stats().message_count, 1);
    }

    #[test]
    fn messages_includes_system_prompt_first() {
        let mut ctx = ContextManager::new(test_config());
        ctx.set_system_prompt("be helpful");
        ctx.add_message(Message::user("hi"));
        let messages = ctx.messages();
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
    }

    #[test]
    fn needs_compression_below_threshold_is_false() {
        let mut ctx = ContextManager::new(test_config());
        ctx.add_message(Message::user("short"));
        assert!(!ctx.needs_compression());
    }

    #[test]
    fn needs_compression_above_threshold_is_true() {
        let mut ctx = ContextManager::new(test_config());
        let long_text = "x".repeat(4000);
        ctx.add_message(Message::user(long_text));
        assert!(ctx.needs_compression());
    }

    #[tokio::test]
    async fn compress_is_noop_when_not_needed() {
        let mut ctx = ContextManager::new(test_config());
        ctx.add_message(Message::user("hi"));
        let provider = LlmProvider::Dummy(crate::llm::providers::dummy::DummyProvider);
        assert!(!ctx.compress(&provider).await);
    }

    #[tokio::test]
    async fn compress_is_noop_with_few_messages() {
        let mut ctx = ContextManager::new(test_config());
        let long_text = "x".repeat(4000);
        ctx.add_message(Message::user(long_text));
        let provider = LlmProvider::Dummy(crate::llm::providers::dummy::DummyProvider);
        assert!(!ctx.compress(&provider).await);
    }

    #[test]
    fn reset_clears_messages_and_tokens() {
        let mut ctx = ContextManager::new(test_config());
        ctx.add_message(Message::user("hello"));
        ctx.reset();
        assert_eq!(ctx.stats().message_count, 0);
        assert_eq!(ctx.stats().estimated_tokens, 0);
    }
}
