//! Channel adapters: chat-bot front-ends that forward inbound messages to
//! an agent's supervisor and relay replies back to the user.
//!
//! Shared credential handling, allowlist checks, and the routing call into
//! the supervisor live here; `telegram`/`discord` each own transport-specific
//! polling/gateway plumbing.

pub mod discord;
pub mod telegram;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::config::{AgentChannelConfig, Config};
use crate::envelope::WorkerReply;
use crate::supervisor::AgentSupervisor;

/// Shared handle channel adapters use to resolve agent bindings and route
/// inbound messages through the supervisor.
#[derive(Clone)]
pub struct ChannelRouter {
    config: Arc<Config>,
    supervisor: Arc<Mutex<AgentSupervisor>>,
}

impl ChannelRouter {
    pub fn new(config: Arc<Config>, supervisor: Arc<Mutex<AgentSupervisor>>) -> Self {
        Self { config, supervisor }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Forward `text` to `agent_id`'s conversation loop and return the
    /// reply text, or a user-facing error message if the call failed.
    pub async fn route_message(&self, agent_id: &str, source: &str, text: String) -> String {
        let supervisor = self.supervisor.lock().await;
        match supervisor.send_message(agent_id, text, source).await {
            Ok(WorkerReply::Reply { content, .. }) => {
                if content.is_empty() {
                    "(empty response)".to_string()
                } else {
                    content
                }
            }
            Ok(WorkerReply::Error { message, .. }) => format!("agent error: {message}"),
            Ok(_) => "(unexpected reply)".to_string(),
            Err(e) => {
                warn!(%agent_id, %source, error = %e, "failed to route message to agent");
                "agent is not available right now".to_string()
            }
        }
    }
}

/// Map each distinct bot token to the first agent id that declares it, so
/// agents sharing credentials all route through one bot connection.
pub fn dedupe_by_token<'a>(
    agents: impl Iterator<Item = (&'a str, &'a AgentChannelConfig)>,
) -> Vec<(String, &'a str, &'a AgentChannelConfig)> {
    let mut seen: HashMap<String, &'a str> = HashMap::new();
    let mut bindings = Vec::new();

    for (agent_id, channel_cfg) in agents {
        let Some(token) = channel_cfg.bot_token.resolve() else {
            warn!(%agent_id, "channel configured but no bot token resolved, skipping");
            continue;
        };

        if let Some(owner) = seen.get(&token) {
            tracing::info!(%agent_id, shares_with = owner, "agent shares bot credentials with another agent");
            continue;
        }

        seen.insert(token.clone(), agent_id);
        bindings.push((token, agent_id, channel_cfg));
    }

    bindings
}

pub fn is_user_allowed(channel_cfg: &AgentChannelConfig, user_id: i64) -> bool {
    channel_cfg.allowed_user_ids.is_empty() || channel_cfg.allowed_user_ids.contains(&user_id)
}

pub fn is_guild_allowed(channel_cfg: &AgentChannelConfig, guild_id: i64) -> bool {
    channel_cfg.allowed_guild_ids.is_empty() || channel_cfg.allowed_guild_ids.contains(&guild_id)
}

pub fn is_channel_allowed(channel_cfg: &AgentChannelConfig, channel_id: i64) -> bool {
    channel_cfg.allowed_channel_ids.is_empty() || channel_cfg.allowed_channel_ids.contains(&channel_id)
}

pub fn is_owner(channel_cfg: &AgentChannelConfig, user_id: i64) -> bool {
    channel_cfg.owner_ids.contains(&user_id)
}

/// Sensitive slash-commands (model switch, context reset, restart) are
/// gated to configured owners when an owner list is non-empty.
pub fn may_run_sensitive_command(channel_cfg: &AgentChannelConfig, user_id: i64) -> bool {
    channel_cfg.owner_ids.is_empty() || is_owner(channel_cfg, user_id)
}

/// Handle a `/`-prefixed system command shared across channels. Returns
/// `None` when `text` isn't a recognized command, so the caller can fall
/// back to routing it as a regular chat message.
pub async fn handle_system_command(
    router: &ChannelRouter,
    agent_id: &str,
    channel_cfg: &AgentChannelConfig,
    user_id: i64,
    text: &str,
) -> Option<String> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let arg = parts.next().unwrap_or_default().trim();

    let reply = match command {
        "start" | "help" => Some(
            "Commands: /reset /context /usage /status /model <name> /agent /help".to_string(),
        ),
        "reset" => {
            if !may_run_sensitive_command(channel_cfg, user_id) {
                return Some("you are not authorized to run this command".to_string());
            }
            let supervisor = router.supervisor.lock().await;
            Some(match supervisor.reset_context(agent_id).await {
                Ok(_) => "context reset.".to_string(),
                Err(e) => format!("failed to reset context: {e}"),
            })
        }
        "context" => {
            let supervisor = router.supervisor.lock().await;
            Some(match supervisor.get_stats(agent_id).await {
                Ok(WorkerReply::Stats { stats, .. }) => format!(
                    "messages: {}, estimated tokens: {}/{} ({:.0}%), compressions: {}",
                    stats.message_count,
                    stats.estimated_tokens,
                    stats.max_tokens,
                    stats.usage_ratio * 100.0,
                    stats.compression_count
                ),
                Ok(_) => "(unexpected reply)".to_string(),
                Err(e) => format!("failed to read context stats: {e}"),
            })
        }
        "model" => {
            if !may_run_sensitive_command(channel_cfg, user_id) {
                return Some("you are not authorized to run this command".to_string());
            }
            if arg.is_empty() {
                Some("usage: /model <model-name>".to_string())
            } else {
                let supervisor = router.supervisor.lock().await;
                Some(match supervisor.set_model(agent_id, arg.to_string()).await {
                    Ok(_) => format!("model switched to {arg}."),
                    Err(e) => format!("failed to switch model: {e}"),
                })
            }
        }
        "agent" => Some(format!("agent: {agent_id}")),
        "status" | "usage" => Some(format!("agent '{agent_id}' is running")),
        _ => None,
    };

    reply.or_else(|| Some(format!("unknown command: /{command}")))
}

/// Telegram's hard per-message length cap; callers chunk at this boundary
/// rather than truncating. Discord's own 2000-char cap is handled
/// separately in `discord.rs`.
pub const MAX_MESSAGE_LENGTH: usize = 4096;

pub fn chunk_message(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars.chunks(MAX_MESSAGE_LENGTH).map(|c| c.iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CredentialRef;

    fn channel_cfg(allowed_users: Vec<i64>, owners: Vec<i64>) -> AgentChannelConfig {
        AgentChannelConfig {
            bot_token: CredentialRef { value: Some("tok".to_string()), env_var: None },
            allowed_user_ids: allowed_users,
            allowed_guild_ids: Vec::new(),
            allowed_channel_ids: Vec::new(),
            owner_ids: owners,
        }
    }

    #[test]
    fn empty_allowlist_allows_all() {
        let cfg = channel_cfg(vec![], vec![]);
        assert!(is_user_allowed(&cfg, 12345));
    }

    #[test]
    fn non_empty_allowlist_restricts() {
        let cfg = channel_cfg(vec![1, 2, 3], vec![]);
        assert!(is_user_allowed(&cfg, 2));
        assert!(!is_user_allowed(&cfg, 99));
    }

    #[test]
    fn sensitive_command_requires_owner_when_configured() {
        let cfg = channel_cfg(vec![], vec![42]);
        assert!(may_run_sensitive_command(&cfg, 42));
        assert!(!may_run_sensitive_command(&cfg, 7));
    }

    #[test]
    fn sensitive_command_open_when_no_owners_configured() {
        let cfg = channel_cfg(vec![], vec![]);
        assert!(may_run_sensitive_command(&cfg, 7));
    }

    #[test]
    fn dedupe_by_token_keeps_first_binding() {
        let cfg_a = channel_cfg(vec![], vec![]);
        let mut cfg_b = channel_cfg(vec![], vec![]);
        cfg_b.bot_token = CredentialRef { value: Some("tok".to_string()), env_var: None };
        let agents = vec![("agent_a", &cfg_a), ("agent_b", &cfg_b)];
        let bindings = dedupe_by_token(agents.into_iter());
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].1, "agent_a");
    }

    #[test]
    fn chunk_message_splits_long_text() {
        let text = "x".repeat(MAX_MESSAGE_LENGTH + 10);
        let chunks = chunk_message(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), MAX_MESSAGE_LENGTH);
    }
}
