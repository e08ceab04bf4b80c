//! Model registry: preset model lists and pricing for each supported
//! provider, plus name-to-provider resolution.

use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: &'static str,
    pub provider: &'static str,
    pub context_window: u64,
    pub input_price_per_1m: f64,
    pub output_price_per_1m: f64,
    pub description: &'static str,
}

macro_rules! model {
    ($name:expr, $provider:expr, $ctx:expr, $in_price:expr, $out_price:expr, $desc:expr) => {
        ModelInfo {
            name: $name,
            provider: $provider,
            context_window: $ctx,
            input_price_per_1m: $in_price,
            output_price_per_1m: $out_price,
            description: $desc,
        }
    };
}

static GOOGLE_MODELS: LazyLock<Vec<ModelInfo>> = LazyLock::new(|| {
    vec![
        model!("gemini-2.5-pro", "google", 1_000_000, 1.25, 10.0, "Most capable reasoning model"),
        model!("gemini-2.5-flash", "google", 1_000_000, 0.15, 0.60, "Best price-performance (default)"),
        model!("gemini-2.0-flash", "google", 1_000_000, 0.10, 0.40, "Fast responses"),
        model!("gemini-2.0-flash-lite", "google", 1_000_000, 0.075, 0.30, "Lowest cost"),
        model!("gemini-1.5-pro", "google", 2_000_000, 1.25, 5.00, "Long context"),
        model!("gemini-1.5-flash", "google", 1_000_000, 0.075, 0.30, "Lightweight fast"),
    ]
});

static OPENAI_MODELS: LazyLock<Vec<ModelInfo>> = LazyLock::new(|| {
    vec![
        model!("gpt-4o", "openai", 128_000, 2.50, 10.00, "Flagship multimodal"),
        model!("gpt-4o-mini", "openai", 128_000, 0.15, 0.60, "Small and fast"),
        model!("gpt-4.1", "openai", 1_000_000, 2.00, 8.00, "Latest flagship"),
        model!("gpt-4.1-mini", "openai", 1_000_000, 0.40, 1.60, "Balanced"),
        model!("gpt-4.1-nano", "openai", 1_000_000, 0.10, 0.40, "Fastest and cheapest"),
        model!("o3", "openai", 200_000, 10.00, 40.00, "Advanced reasoning"),
        model!("o3-mini", "openai", 200_000, 1.10, 4.40, "Efficient reasoning"),
        model!("o4-mini", "openai", 200_000, 1.10, 4.40, "Latest reasoning"),
    ]
});

static ANTHROPIC_MODELS: LazyLock<Vec<ModelInfo>> = LazyLock::new(|| {
    vec![
        model!("claude-sonnet-4-20250514", "anthropic", 200_000, 3.00, 15.00, "Latest Sonnet"),
        model!("claude-3.5-sonnet-20241022", "anthropic", 200_000, 3.00, 15.00, "Sonnet 3.5"),
        model!("claude-3.5-haiku-20241022", "anthropic", 200_000, 0.80, 4.00, "Fast and affordable"),
    ]
});

static XAI_MODELS: LazyLock<Vec<ModelInfo>> = LazyLock::new(|| {
    vec![
        model!("grok-3", "xai", 131_072, 3.00, 15.00, "Flagship Grok"),
        model!("grok-3-mini", "xai", 131_072, 0.30, 0.50, "Fast Grok"),
    ]
});

static ALL_MODELS: LazyLock<Vec<ModelInfo>> = LazyLock::new(|| {
    GOOGLE_MODELS
        .iter()
        .chain(OPENAI_MODELS.iter())
        .chain(ANTHROPIC_MODELS.iter())
        .chain(XAI_MODELS.iter())
        .cloned()
        .collect()
});

pub const SUPPORTED_PROVIDERS: &[&str] = &["google", "openai", "anthropic", "openrouter", "xai"];

/// Look up a preset model by exact name. OpenRouter models (free-form,
/// slash-qualified) are never in this table and always return `None`.
pub fn get_model_info(model_name: &str) -> Option<&'static ModelInfo> {
    ALL_MODELS.iter().find(|m| m.name == model_name)
}

/// List known models, optionally filtered by provider.
pub fn list_models(provider: Option<&str>) -> Vec<&'static ModelInfo> {
    match provider {
        Some(p) => ALL_MODELS.iter().filter(|m| m.provider == p).collect(),
        None => ALL_MODELS.iter().collect(),
    }
}

pub fn get_pricing(model_name: &str) -> Option<(f64, f64)> {
    get_model_info(model_name).map(|m| (m.input_price_per_1m, m.output_price_per_1m))
}

/// Resolve a model name to its provider: exact registry hit first, then a
/// name-prefix heuristic for models not in the preset tables, falling back
/// to `default_provider`.
pub fn resolve_provider(model_name: &str, default_provider: &str) -> String {
    if let Some(info) = get_model_info(model_name) {
        return info.provider.to_string();
    }

    if model_name.starts_with("gemini") {
        "google".to_string()
    } else if model_name.starts_with("gpt") || model_name.starts_with("o3") || model_name.starts_with("o4") {
        "openai".to_string()
    } else if model_name.starts_with("claude") {
        "anthropic".to_string()
    } else if model_name.starts_with("grok") {
        "xai".to_string()
    } else if model_name.contains('/') {
        "openrouter".to_string()
    } else {
        default_provider.to_string()
    }
}

/// Render a model list as a provider-grouped table for `/model list`.
pub fn format_model_list(models: &[&ModelInfo]) -> String {
    if models.is_empty() {
        return "No models found.".to_string();
    }

    let mut lines = Vec::new();
    let mut current_provider = "";
    for m in models {
        if m.provider != current_provider {
            if !current_provider.is_empty() {
                lines.push(String::new());
            }
            lines.push(format!("[{}]", m.provider.to_uppercase()));
            lines.push(format!("{:<35} {:>10} {:>12} {:>12}", "Model", "Context", "Input $/1M", "Output $/1M"));
            lines.push("-".repeat(72));
            current_provider = m.provider;
        }
        let ctx = if m.context_window < 1_000_000 {
            format!("{}K", m.context_window / 1_000)
        } else {
            format!("{}M", m.context_window / 1_000_000)
        };
        lines.push(format!(
            "{:<35} {:>10} {:>12} {:>12}",
            m.name,
            ctx,
            format!("${:.3}", m.input_price_per_1m),
            format!("${:.3}", m.output_price_per_1m)
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_model() {
        let info = get_model_info("gemini-2.5-flash").expect("known model");
        assert_eq!(info.provider, "google");
    }

    #[test]
    fn lookup_unknown_model_returns_none() {
        assert!(get_model_info("totally-made-up-model").is_none());
    }

    #[test]
    fn list_filters_by_provider() {
        let models = list_models(Some("openai"));
        assert!(!models.is_empty());
        assert!(models.iter().all(|m| m.provider == "openai"));
    }

    #[test]
    fn resolve_provider_by_registry_hit() {
        assert_eq!(resolve_provider("claude-sonnet-4-20250514", "google"), "anthropic");
    }

    #[test]
    fn resolve_provider_by_prefix_heuristic() {
        assert_eq!(resolve_provider("gemini-3.0-preview", "google"), "google");
        assert_eq!(resolve_provider("gpt-5", "google"), "openai");
        assert_eq!(resolve_provider("grok-4", "google"), "xai");
    }

    #[test]
    fn resolve_provider_slash_qualified_is_openrouter() {
        assert_eq!(resolve_provider("mistralai/mixtral-8x7b", "google"), "openrouter");
    }

    #[test]
    fn resolve_provider_falls_back_to_default() {
        assert_eq!(resolve_provider("some-unknown-llm", "anthropic"), "anthropic");
    }

    #[test]
    fn pricing_matches_registry() {
        let (input, output) = get_pricing("gpt-4o-mini").expect("known model");
        assert_eq!(input, 0.15);
        assert_eq!(output, 0.60);
    }

    #[test]
    fn format_model_list_groups_by_provider() {
        let models = list_models(Some("xai"));
        let rendered = format_model_list(&models);
        assert!(rendered.contains("XAI"));
        assert!(rendered.contains("grok-3"));
    }
}
