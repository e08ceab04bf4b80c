//! Token accounting: per-agent session counters plus an append-only JSONL
//! usage log under the agent's workspace.

use std::{
    collections::BTreeMap,
    io::Write,
    path::PathBuf,
    sync::Mutex,
};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::registry;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub requests: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TotalUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub requests: u64,
    pub by_model: BTreeMap<String, Usage>,
}

#[derive(Debug, Deserialize)]
struct LogEntry {
    #[serde(default)]
    model: String,
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cost_usd: f64,
}

/// Tracks token usage and cost for one agent across its lifetime.
pub struct TokenCounter {
    agent_id: String,
    log_file: PathBuf,
    session: Mutex<Usage>,
}

impl TokenCounter {
    pub fn new(agent_id: impl Into<String>, workspace: &std::path::Path) -> Self {
        Self {
            agent_id: agent_id.into(),
            log_file: workspace.join("token_usage.jsonl"),
            session: Mutex::new(Usage::default()),
        }
    }

    /// Record usage for one completed LLM call and return the call's cost.
    /// Unknown models price at zero. Log-write failures never propagate —
    /// accounting must never break the conversation loop.
    pub fn record(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let cost = registry::get_pricing(model)
            .map(|(input_price, output_price)| {
                (input_tokens as f64 / 1_000_000.0) * input_price
                    + (output_tokens as f64 / 1_000_000.0) * output_price
            })
            .unwrap_or(0.0);

        {
            let mut session = self.session.lock().expect("token counter mutex poisoned");
            session.input_tokens += input_tokens;
            session.output_tokens += output_tokens;
            session.cost_usd += cost;
            session.requests += 1;
        }

        let _ = self.append_to_log(model, input_tokens, output_tokens, cost);
        cost
    }

    pub fn session_usage(&self) -> Usage {
        self.session.lock().expect("token counter mutex poisoned").clone()
    }

    /// Stream the JSONL log and aggregate total usage, grouped by model.
    /// Malformed lines are skipped; a missing log file yields zero totals.
    pub fn total_usage(&self) -> TotalUsage {
        let mut totals = TotalUsage::default();

        let Ok(content) = std::fs::read_to_string(&self.log_file) else {
            return totals;
        };

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(entry) = serde_json::from_str::<LogEntry>(line) else {
                continue;
            };

            totals.input_tokens += entry.input_tokens;
            totals.output_tokens += entry.output_tokens;
            totals.cost_usd += entry.cost_usd;
            totals.requests += 1;

            let model = if entry.model.is_empty() { "unknown".to_string() } else { entry.model };
            let by_model = totals.by_model.entry(model).or_default();
            by_model.input_tokens += entry.input_tokens;
            by_model.output_tokens += entry.output_tokens;
            by_model.cost_usd += entry.cost_usd;
            by_model.requests += 1;
        }

        totals
    }

    pub fn format_session_usage(&self) -> String {
        Self::format_usage(&self.agent_id, &self.session_usage(), None)
    }

    pub fn format_total_usage(&self) -> String {
        let totals = self.total_usage();
        let by_model = totals.by_model.clone();
        Self::format_usage(
            &self.agent_id,
            &Usage {
                input_tokens: totals.input_tokens,
                output_tokens: totals.output_tokens,
                cost_usd: totals.cost_usd,
                requests: totals.requests,
            },
            Some(&by_model),
        )
    }

    fn format_usage(agent_id: &str, usage: &Usage, by_model: Option<&BTreeMap<String, Usage>>) -> String {
        let mut lines = vec![
            format!("Token usage (agent: {agent_id})"),
            format!("  requests: {}", usage.requests),
            format!("  input tokens: {}", usage.input_tokens),
            format!("  output tokens: {}", usage.output_tokens),
            format!("  total cost: ${:.4}", usage.cost_usd),
        ];
        if let Some(by_model) = by_model
            && !by_model.is_empty()
        {
            lines.push("  by model:".to_string());
            for (model, stats) in by_model {
                lines.push(format!(
                    "    {model}: {} calls, {}+{} tokens, ${:.4}",
                    stats.requests, stats.input_tokens, stats.output_tokens, stats.cost_usd
                ));
            }
        }
        lines.join("\n")
    }

    fn append_to_log(&self, model: &str, input_tokens: u64, output_tokens: u64, cost: f64) -> std::io::Result<()> {
        if let Some(parent) = self.log_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "agent_id": self.agent_id,
            "model": model,
            "input_tokens": input_tokens,
            "output_tokens": output_tokens,
            "cost_usd": cost,
        });
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&self.log_file)?;
        writeln!(file, "{entry}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn record_accumulates_session_usage() {
        let dir = TempDir::new().unwrap();
        let counter = TokenCounter::new("agent1", dir.path());
        counter.record("gpt-4o-mini", 1000, 500);
        counter.record("gpt-4o-mini", 2000, 1000);
        let usage = counter.session_usage();
        assert_eq!(usage.requests, 2);
        assert_eq!(usage.input_tokens, 3000);
        assert_eq!(usage.output_tokens, 1500);
        assert!(usage.cost_usd > 0.0);
    }

    #[test]
    fn unknown_model_costs_zero() {
        let dir = TempDir::new().unwrap();
        let counter = TokenCounter::new("agent1", dir.path());
        let cost = counter.record("nonexistent-model-xyz", 1000, 1000);
        assert_eq!(cost, 0.0);
    }

    #[test]
    fn total_usage_reads_back_log() {
        let dir = TempDir::new().unwrap();
        let counter = TokenCounter::new("agent1", dir.path());
        counter.record("gpt-4o-mini", 100, 50);
        counter.record("claude-3.5-haiku-20241022", 200, 100);

        let totals = counter.total_usage();
        assert_eq!(totals.requests, 2);
        assert_eq!(totals.by_model.len(), 2);
        assert!(totals.by_model.contains_key("gpt-4o-mini"));
    }

    #[test]
    fn total_usage_missing_log_is_zero() {
        let dir = TempDir::new().unwrap();
        let counter = TokenCounter::new("agent1", dir.path());
        let totals = counter.total_usage();
        assert_eq!(totals.requests, 0);
        assert_eq!(totals.cost_usd, 0.0);
    }

    #[test]
    fn malformed_log_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let counter = TokenCounter::new("agent1", dir.path());
        counter.record("gpt-4o-mini", 10, 10);
        std::fs::write(
            dir.path().join("token_usage.jsonl"),
            format!(
                "{}\nnot json at all\n",
                std::fs::read_to_string(dir.path().join("token_usage.jsonl")).unwrap().trim_end()
            ),
        )
        .unwrap();
        let totals = counter.total_usage();
        assert_eq!(totals.requests, 1);
    }
}
