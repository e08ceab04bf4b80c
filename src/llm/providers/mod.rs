//! LLM provider implementations.
//!
//! `build(provider_name, config)` is the factory — called once per agent
//! at startup (or on `/model` switch) to resolve a provider name to a
//! concrete `LlmProvider`. Adding a new backend = new module + new arm.

pub mod anthropic;
pub mod dummy;
pub mod google;
pub mod openai;

use futures_util::StreamExt;

use crate::config::ProviderConfig;
use crate::llm::{LlmProvider, ProviderError};

/// Drain an SSE `data: ...` response body, handing each line to `extract`
/// and collecting whatever text chunk it returns. Stops at the `[DONE]`
/// sentinel (OpenAI-compatible) or when the stream closes (Anthropic,
/// Google).
pub(super) async fn collect_sse_chunks(
    response: reqwest::Response,
    mut extract: impl FnMut(&str) -> Option<String>,
) -> Result<Vec<String>, ProviderError> {
    let mut body = response.bytes_stream();
    let mut buf = String::new();
    let mut chunks = Vec::new();

    while let Some(bytes) = body.next().await {
        buf.push_str(&String::from_utf8_lossy(&bytes?));

        while let Some(pos) = buf.find('\n') {
            let line = buf[..pos].trim().to_string();
            buf.drain(..=pos);

            let Some(data) = line.strip_prefix("data:") else { continue };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                return Ok(chunks);
            }
            if let Some(chunk) = extract(data) {
                chunks.push(chunk);
            }
        }
    }

    Ok(chunks)
}

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const XAI_BASE_URL: &str = "https://api.x.ai/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub fn build(provider_name: &str, config: Option<&ProviderConfig>) -> Result<LlmProvider, ProviderError> {
    if provider_name == "dummy" {
        return Ok(LlmProvider::Dummy(dummy::DummyProvider));
    }

    let config = config.ok_or_else(|| ProviderError::UnknownProvider(provider_name.to_string()))?;
    let api_key = config.api_key.resolve().ok_or_else(|| ProviderError::MissingApiKey(provider_name.to_string()))?;
    let timeout = config.timeout_seconds;

    match provider_name {
        "google" => {
            let base_url = config.base_url.clone().unwrap_or_else(|| GOOGLE_BASE_URL.to_string());
            Ok(LlmProvider::Google(google::GoogleProvider::new(api_key, base_url, timeout)?))
        }
        "anthropic" => {
            let base_url = config.base_url.clone().unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string());
            Ok(LlmProvider::Anthropic(anthropic::AnthropicProvider::new(api_key, base_url, timeout)?))
        }
        "openai" => {
            let base_url = config.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string());
            Ok(LlmProvider::OpenAi(openai::OpenAiCompatibleProvider::new(api_key, base_url, timeout)?))
        }
        "openrouter" => {
            let base_url = config.base_url.clone().unwrap_or_else(|| OPENROUTER_BASE_URL.to_string());
            Ok(LlmProvider::OpenRouter(openai::OpenAiCompatibleProvider::new(api_key, base_url, timeout)?))
        }
        "xai" => {
            let base_url = config.base_url.clone().unwrap_or_else(|| XAI_BASE_URL.to_string());
            Ok(LlmProvider::Xai(openai::OpenAiCompatibleProvider::new(api_key, base_url, timeout)?))
        }
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_builds_without_config() {
        let provider = build("dummy", None).unwrap();
        assert!(matches!(provider, LlmProvider::Dummy(_)));
    }

    #[test]
    fn unknown_provider_without_config_errors() {
        let result = build("not-a-real-provider", None);
        assert!(result.is_err());
    }

    #[test]
    fn missing_api_key_errors() {
        let config =
            ProviderConfig { api_key: crate::config::CredentialRef::default(), base_url: None, timeout_seconds: 30 };
        let result = build("openai", Some(&config));
        assert!(matches!(result, Err(ProviderError::MissingApiKey(_))));
    }
}
