#![cfg_attr(test, allow(dead_code))]
//! Configuration loading with env-var overrides.
//!
//! Reads a TOML file (explicit `--config`, then `./config.toml`, then
//! `~/.araliya/config.toml`, then `/etc/araliya/config.toml`), deep-merges
//! any `[meta] base = "..."` chain, then applies `ARALIYA_WORK_DIR` and
//! `ARALIYA_LOG_LEVEL` env overrides.

use std::{
    collections::{HashMap, HashSet},
    env,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;
use crate::sandbox::SandboxMode;

// ── Resolved config types ──────────────────────────────────────────────────

/// A credential that can be supplied directly or read from an environment
/// variable. Direct value wins; empty/unset fields mean "not configured".
#[derive(Debug, Clone, Default)]
pub struct CredentialRef {
    pub value: Option<String>,
    pub env_var: Option<String>,
}

impl CredentialRef {
    /// Resolve to a concrete secret, or `None` if neither source is set.
    pub fn resolve(&self) -> Option<String> {
        if let Some(v) = &self.value
            && !v.is_empty()
        {
            return Some(v.clone());
        }
        if let Some(ev) = &self.env_var
            && let Ok(val) = env::var(ev)
            && !val.is_empty()
        {
            return Some(val);
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub default_agent: String,
    pub pid_file: PathBuf,
    pub data_dir: PathBuf,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: CredentialRef,
    pub base_url: Option<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub default_provider: String,
    pub default_model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub providers: HashMap<String, ProviderConfig>,
}

#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub max_tokens: u64,
    pub compress_threshold_ratio: f64,
    pub compress_target_ratio: f64,
    pub compress_model: String,
}

#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub timeout_seconds: u64,
    pub max_output_chars: usize,
    pub dangerous_commands: HashSet<String>,
    pub blocked_commands: Vec<String>,
    pub history_max_entries: usize,
    pub history_max_file_size_mb: u64,
    pub history_record_output: bool,
    pub history_output_max_chars: usize,
}

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

/// Per-channel binding for one agent: credential plus allowlists.
/// `allowed_guild_ids`/`allowed_channel_ids` apply to Discord only.
#[derive(Debug, Clone, Default)]
pub struct AgentChannelConfig {
    pub bot_token: CredentialRef,
    pub allowed_user_ids: Vec<i64>,
    pub allowed_guild_ids: Vec<i64>,
    pub allowed_channel_ids: Vec<i64>,
    /// Users allowed to invoke sensitive commands (`/restart`, `/reset`,
    /// `/model`, `/agent`) for this agent on this channel.
    pub owner_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    pub human_name: String,
    pub workspace: PathBuf,
    pub model: String,
    pub tools: HashSet<String>,
    pub sandbox: SandboxMode,
    pub telegram: Option<AgentChannelConfig>,
    pub discord: Option<AgentChannelConfig>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub global: GlobalConfig,
    pub llm: LlmConfig,
    pub context: ContextConfig,
    pub shell: ShellConfig,
    pub heartbeat: HeartbeatConfig,
    pub agents: HashMap<String, AgentConfig>,
}

impl Config {
    pub fn agent(&self, id: &str) -> Option<&AgentConfig> {
        self.agents.get(id)
    }
}

// ── Raw TOML shape ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    global: RawGlobal,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    context: RawContext,
    #[serde(default)]
    shell: RawShell,
    #[serde(default)]
    heartbeat: RawHeartbeat,
    #[serde(default)]
    agents: HashMap<String, RawAgent>,
}

#[derive(Deserialize)]
struct RawGlobal {
    #[serde(default = "default_agent_name")]
    default_agent: String,
    #[serde(default = "default_pid_file")]
    pid_file: String,
    #[serde(default = "default_data_dir")]
    data_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

impl Default for RawGlobal {
    fn default() -> Self {
        Self {
            default_agent: default_agent_name(),
            pid_file: default_pid_file(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "assistant".to_string()
}
fn default_pid_file() -> String {
    "~/.araliya/daemon.pid".to_string()
}
fn default_data_dir() -> String {
    "~/.araliya".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Deserialize, Default)]
struct RawLlm {
    #[serde(default = "default_provider")]
    default_provider: String,
    #[serde(default = "default_model")]
    default_model: String,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    max_output_tokens: u32,
    #[serde(default)]
    providers: HashMap<String, RawProvider>,
}

fn default_provider() -> String {
    "google".to_string()
}
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_output_tokens() -> u32 {
    8192
}

#[derive(Deserialize, Default)]
struct RawProvider {
    #[serde(default)]
    api_key_value: Option<String>,
    #[serde(default)]
    api_key_env: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default = "default_provider_timeout")]
    timeout_seconds: u64,
}

fn default_provider_timeout() -> u64 {
    60
}

#[derive(Deserialize)]
struct RawContext {
    #[serde(default = "default_max_tokens")]
    max_tokens: u64,
    #[serde(default = "default_compress_threshold_ratio")]
    compress_threshold_ratio: f64,
    #[serde(default = "default_compress_target_ratio")]
    compress_target_ratio: f64,
    #[serde(default = "default_compress_model")]
    compress_model: String,
}

impl Default for RawContext {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            compress_threshold_ratio: default_compress_threshold_ratio(),
            compress_target_ratio: default_compress_target_ratio(),
            compress_model: default_compress_model(),
        }
    }
}

fn default_max_tokens() -> u64 {
    200_000
}
fn default_compress_threshold_ratio() -> f64 {
    0.7
}
fn default_compress_target_ratio() -> f64 {
    0.3
}
fn default_compress_model() -> String {
    "gemini-2.0-flash".to_string()
}

#[derive(Deserialize)]
struct RawShell {
    #[serde(default = "default_shell_timeout")]
    timeout_seconds: u64,
    #[serde(default = "default_max_output_chars")]
    max_output_chars: usize,
    #[serde(default = "default_dangerous_commands")]
    dangerous_commands: Vec<String>,
    #[serde(default = "default_blocked_commands")]
    blocked_commands: Vec<String>,
    #[serde(default = "default_history_max_entries")]
    history_max_entries: usize,
    #[serde(default = "default_history_max_size_mb")]
    history_max_file_size_mb: u64,
    #[serde(default = "default_true")]
    history_record_output: bool,
    #[serde(default = "default_history_output_max_chars")]
    history_output_max_chars: usize,
}

impl Default for RawShell {
    fn default() -> Self {
        Self {
            timeout_seconds: default_shell_timeout(),
            max_output_chars: default_max_output_chars(),
            dangerous_commands: default_dangerous_commands(),
            blocked_commands: default_blocked_commands(),
            history_max_entries: default_history_max_entries(),
            history_max_file_size_mb: default_history_max_size_mb(),
            history_record_output: true,
            history_output_max_chars: default_history_output_max_chars(),
        }
    }
}

fn default_shell_timeout() -> u64 {
    30
}
fn default_max_output_chars() -> usize {
    10_000
}
fn default_dangerous_commands() -> Vec<String> {
    [
        "rm", "rmdir", "shred", "chmod", "chown", "sudo", "su", "shutdown", "reboot", "kill",
        "killall", "mkfs", "fdisk", "dd",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_blocked_commands() -> Vec<String> {
    vec!["rm -rf /".to_string(), "rm -rf ~".to_string(), ":(){ :|:& };:".to_string()]
}
fn default_history_max_entries() -> usize {
    10_000
}
fn default_history_max_size_mb() -> u64 {
    50
}
fn default_history_output_max_chars() -> usize {
    500
}

#[derive(Deserialize)]
struct RawHeartbeat {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_heartbeat_interval")]
    interval_seconds: u64,
}

impl Default for RawHeartbeat {
    fn default() -> Self {
        Self { enabled: true, interval_seconds: default_heartbeat_interval() }
    }
}

fn default_heartbeat_interval() -> u64 {
    300
}

#[derive(Deserialize)]
struct RawAgent {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_agent_display_name")]
    name: String,
    #[serde(default = "default_human_name")]
    human_name: String,
    workspace: String,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default = "default_agent_tools")]
    tools: Vec<String>,
    #[serde(default = "default_sandbox")]
    sandbox: String,
    #[serde(default)]
    telegram: Option<RawAgentChannel>,
    #[serde(default)]
    discord: Option<RawAgentChannel>,
}

fn default_agent_display_name() -> String {
    "Araliya".to_string()
}
fn default_human_name() -> String {
    "Human".to_string()
}
fn default_agent_tools() -> Vec<String> {
    vec!["shell".to_string(), "memory".to_string(), "task".to_string()]
}
fn default_sandbox() -> String {
    "confined".to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Deserialize, Default)]
struct RawAgentChannel {
    #[serde(default)]
    bot_token_value: Option<String>,
    #[serde(default)]
    bot_token_env: Option<String>,
    #[serde(default)]
    allowed_user_ids: Vec<i64>,
    #[serde(default)]
    allowed_guild_ids: Vec<i64>,
    #[serde(default)]
    allowed_channel_ids: Vec<i64>,
    #[serde(default)]
    owner_ids: Vec<i64>,
}

// ── Merge + load ─────────────────────────────────────────────────────────────

/// Deep-merge two TOML values; overlay wins on scalars, tables merge recursively.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_tbl), toml::Value::Table(overlay_tbl)) => {
            for (key, ov_val) in overlay_tbl {
                let merged = match base_tbl.remove(&key) {
                    Some(base_val) => merge_toml(base_val, ov_val),
                    None => ov_val,
                };
                base_tbl.insert(key, merged);
            }
            toml::Value::Table(base_tbl)
        }
        (_, overlay) => overlay,
    }
}

fn load_raw_merged(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<toml::Value, AppError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        return Err(AppError::Config(format!(
            "circular base reference detected at: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let overlay_val: toml::Value = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    if let Some(base_str) =
        overlay_val.get("meta").and_then(|m| m.get("base")).and_then(|b| b.as_str())
    {
        let base_path = if Path::new(base_str).is_absolute() {
            PathBuf::from(base_str)
        } else {
            path.parent().unwrap_or(Path::new(".")).join(base_str)
        };
        let base_val = load_raw_merged(&base_path, visited)?;
        Ok(merge_toml(base_val, overlay_val))
    } else {
        Ok(overlay_val)
    }
}

/// Locate the config file: explicit path, else `./config.toml`, else
/// `~/.araliya/config.toml`, else `/etc/araliya/config.toml`.
fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(PathBuf::from(p));
    }
    let candidates = [
        PathBuf::from("config.toml"),
        expand_home("~/.araliya/config.toml"),
        PathBuf::from("/etc/araliya/config.toml"),
    ];
    candidates.into_iter().find(|c| c.exists())
}

/// Load config from the resolved path, or built-in defaults if none exists.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let work_dir_override = env::var("ARALIYA_WORK_DIR").ok();
    let log_level_override = env::var("ARALIYA_LOG_LEVEL").ok();

    match resolve_config_path(config_path) {
        Some(path) => {
            if !path.exists() {
                return Err(AppError::Config(format!("config file not found: {}", path.display())));
            }
            load_from(&path, work_dir_override.as_deref(), log_level_override.as_deref())
        }
        None => Ok(default_config(work_dir_override.as_deref(), log_level_override.as_deref())),
    }
}

fn default_config(work_dir_override: Option<&str>, log_level_override: Option<&str>) -> Config {
    let data_dir = expand_home(work_dir_override.unwrap_or("~/.araliya"));
    let log_level = log_level_override.unwrap_or("info").to_string();
    Config {
        global: GlobalConfig {
            default_agent: default_agent_name(),
            pid_file: data_dir.join("daemon.pid"),
            data_dir,
            log_level,
        },
        llm: LlmConfig {
            default_provider: default_provider(),
            default_model: default_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            providers: HashMap::new(),
        },
        context: ContextConfig {
            max_tokens: default_max_tokens(),
            compress_threshold_ratio: default_compress_threshold_ratio(),
            compress_target_ratio: default_compress_target_ratio(),
            compress_model: default_compress_model(),
        },
        shell: ShellConfig {
            timeout_seconds: default_shell_timeout(),
            max_output_chars: default_max_output_chars(),
            dangerous_commands: default_dangerous_commands().into_iter().collect(),
            blocked_commands: default_blocked_commands(),
            history_max_entries: default_history_max_entries(),
            history_max_file_size_mb: default_history_max_size_mb(),
            history_record_output: true,
            history_output_max_chars: default_history_output_max_chars(),
        },
        heartbeat: HeartbeatConfig { enabled: true, interval_seconds: default_heartbeat_interval() },
        agents: HashMap::new(),
    }
}

/// Internal loader — accepts an explicit path and optional overrides.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let merged_val = load_raw_merged(path, &mut HashSet::new())?;

    let parsed: RawConfig = serde::Deserialize::deserialize(merged_val)
        .map_err(|e: toml::de::Error| AppError::Config(format!("config error in {}: {e}", path.display())))?;

    let data_dir = expand_home(work_dir_override.unwrap_or(&parsed.global.data_dir));
    let log_level = log_level_override.unwrap_or(&parsed.global.log_level).to_string();
    let pid_file_raw = expand_home(&parsed.global.pid_file);
    let pid_file = if pid_file_raw.is_absolute() { pid_file_raw } else { data_dir.join(pid_file_raw) };

    let providers = parsed
        .llm
        .providers
        .into_iter()
        .map(|(name, p)| {
            (
                name,
                ProviderConfig {
                    api_key: CredentialRef { value: p.api_key_value, env_var: p.api_key_env },
                    base_url: p.base_url,
                    timeout_seconds: p.timeout_seconds,
                },
            )
        })
        .collect();

    let mut agents = HashMap::new();
    for (id, raw) in parsed.agents {
        if !raw.enabled {
            continue;
        }
        let sandbox = raw
            .sandbox
            .parse::<SandboxMode>()
            .map_err(|e| AppError::Config(format!("agent '{id}': {e}")))?;
        let workspace_raw = expand_home(&raw.workspace);
        let workspace = if workspace_raw.is_absolute() { workspace_raw } else { data_dir.join(workspace_raw) };

        agents.insert(
            id.clone(),
            AgentConfig {
                id: id.clone(),
                name: raw.name,
                human_name: raw.human_name,
                workspace,
                model: raw.model,
                tools: raw.tools.into_iter().collect(),
                sandbox,
                telegram: raw.telegram.map(to_agent_channel),
                discord: raw.discord.map(to_agent_channel),
            },
        );
    }

    Ok(Config {
        global: GlobalConfig { default_agent: parsed.global.default_agent, pid_file, data_dir, log_level },
        llm: LlmConfig {
            default_provider: parsed.llm.default_provider,
            default_model: parsed.llm.default_model,
            temperature: parsed.llm.temperature,
            max_output_tokens: parsed.llm.max_output_tokens,
            providers,
        },
        context: ContextConfig {
            max_tokens: parsed.context.max_tokens,
            compress_threshold_ratio: parsed.context.compress_threshold_ratio,
            compress_target_ratio: parsed.context.compress_target_ratio,
            compress_model: parsed.context.compress_model,
        },
        shell: ShellConfig {
            timeout_seconds: parsed.shell.timeout_seconds,
            max_output_chars: parsed.shell.max_output_chars,
            dangerous_commands: parsed.shell.dangerous_commands.into_iter().collect(),
            blocked_commands: parsed.shell.blocked_commands,
            history_max_entries: parsed.shell.history_max_entries,
            history_max_file_size_mb: parsed.shell.history_max_file_size_mb,
            history_record_output: parsed.shell.history_record_output,
            history_output_max_chars: parsed.shell.history_output_max_chars,
        },
        heartbeat: HeartbeatConfig {
            enabled: parsed.heartbeat.enabled,
            interval_seconds: parsed.heartbeat.interval_seconds,
        },
        agents,
    })
}

fn to_agent_channel(raw: RawAgentChannel) -> AgentChannelConfig {
    AgentChannelConfig {
        bot_token: CredentialRef { value: raw.bot_token_value, env_var: raw.bot_token_env },
        allowed_user_ids: raw.allowed_user_ids,
        allowed_guild_ids: raw.allowed_guild_ids,
        allowed_channel_ids: raw.allowed_channel_ids,
        owner_ids: raw.owner_ids,
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~"
        && let Some(home) = dirs::home_dir()
    {
        return home;
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

#[cfg(test)]
impl Config {
    /// Safe `Config` for unit tests — dummy provider, no API keys, no external calls.
    pub fn test_default(work_dir: &Path) -> Self {
        let mut agents = HashMap::new();
        agents.insert(
            "echo".to_string(),
            AgentConfig {
                id: "echo".to_string(),
                name: "Echo".to_string(),
                human_name: "Human".to_string(),
                workspace: work_dir.join("agents/echo"),
                model: "test-model".to_string(),
                tools: ["shell", "memory", "task"].into_iter().map(String::from).collect(),
                sandbox: SandboxMode::Confined,
                telegram: None,
                discord: None,
            },
        );
        Self {
            global: GlobalConfig {
                default_agent: "echo".to_string(),
                pid_file: work_dir.join("daemon.pid"),
                data_dir: work_dir.to_path_buf(),
                log_level: "info".to_string(),
            },
            llm: LlmConfig {
                default_provider: "dummy".to_string(),
                default_model: "test-model".to_string(),
                temperature: 0.0,
                max_output_tokens: 256,
                providers: HashMap::new(),
            },
            context: ContextConfig {
                max_tokens: 100_000,
                compress_threshold_ratio: 0.7,
                compress_target_ratio: 0.3,
                compress_model: "test-model".to_string(),
            },
            shell: ShellConfig {
                timeout_seconds: 5,
                max_output_chars: 10_000,
                dangerous_commands: default_dangerous_commands().into_iter().collect(),
                blocked_commands: default_blocked_commands(),
                history_max_entries: 1000,
                history_max_file_size_mb: 5,
                history_record_output: true,
                history_output_max_chars: 500,
            },
            heartbeat: HeartbeatConfig { enabled: false, interval_seconds: 300 },
            agents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    const MINIMAL_TOML: &str = r#"
[global]
default_agent = "assistant"
data_dir = "~/.araliya"
log_level = "info"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_basic_config() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.global.default_agent, "assistant");
        assert_eq!(cfg.global.log_level, "info");
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/.araliya");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with(".araliya"));
    }

    #[test]
    fn absolute_path_unchanged() {
        let p = expand_home("/absolute/path");
        assert_eq!(p, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), None, None);
        assert!(result.is_err());
    }

    #[test]
    fn env_work_dir_override() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), Some("/tmp/test-override"), None).unwrap();
        assert_eq!(cfg.global.data_dir, PathBuf::from("/tmp/test-override"));
    }

    #[test]
    fn env_log_level_override() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, Some("debug")).unwrap();
        assert_eq!(cfg.global.log_level, "debug");
    }

    #[test]
    fn credential_ref_prefers_direct_value() {
        let c = CredentialRef { value: Some("secret".to_string()), env_var: Some("NOPE_ENV_VAR".to_string()) };
        assert_eq!(c.resolve(), Some("secret".to_string()));
    }

    #[test]
    fn credential_ref_falls_back_to_env() {
        // SAFETY: test-only env mutation, not shared across threads in this test binary segment.
        unsafe { env::set_var("ARALIYA_TEST_CRED_VAR", "from-env") };
        let c = CredentialRef { value: None, env_var: Some("ARALIYA_TEST_CRED_VAR".to_string()) };
        assert_eq!(c.resolve(), Some("from-env".to_string()));
        unsafe { env::remove_var("ARALIYA_TEST_CRED_VAR") };
    }

    #[test]
    fn credential_ref_none_when_unset() {
        let c = CredentialRef::default();
        assert_eq!(c.resolve(), None);
    }

    fn write_named(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let p = dir.path().join(name);
        std::fs::write(&p, content).unwrap();
        p
    }

    const BASE_TOML: &str = r#"
[global]
default_agent = "assistant"
data_dir = "~/.araliya"
log_level = "info"

[llm]
default_provider = "google"
default_model = "gemini-base"
"#;

    #[test]
    fn overlay_keeps_base_fields() {
        let dir = TempDir::new().unwrap();
        write_named(&dir, "base.toml", BASE_TOML);
        let overlay = r#"
[meta]
base = "base.toml"

[global]
log_level = "debug"
"#;
        let overlay_path = write_named(&dir, "overlay.toml", overlay);
        let cfg = load_from(&overlay_path, None, None).unwrap();
        assert_eq!(cfg.global.default_agent, "assistant");
        assert_eq!(cfg.global.log_level, "debug");
    }

    #[test]
    fn overlay_wins_scalar() {
        let dir = TempDir::new().unwrap();
        write_named(&dir, "base.toml", BASE_TOML);
        let overlay = r#"
[meta]
base = "base.toml"

[llm]
default_model = "gemini-overlay"
"#;
        let overlay_path = write_named(&dir, "overlay.toml", overlay);
        let cfg = load_from(&overlay_path, None, None).unwrap();
        assert_eq!(cfg.llm.default_model, "gemini-overlay");
        assert_eq!(cfg.llm.default_provider, "google");
    }

    #[test]
    fn missing_base_errors() {
        let dir = TempDir::new().unwrap();
        let overlay = r#"
[meta]
base = "nonexistent.toml"

[global]
default_agent = "x"
data_dir = "~/.araliya"
log_level = "info"
"#;
        let overlay_path = write_named(&dir, "overlay.toml", overlay);
        let result = load_from(&overlay_path, None, None);
        assert!(result.is_err());
    }

    #[test]
    fn cycle_detection() {
        let dir = TempDir::new().unwrap();
        let self_path = dir.path().join("self.toml");
        let content = format!("[meta]\nbase = \"{}\"\n\n{BASE_TOML}", self_path.display());
        std::fs::write(&self_path, content).unwrap();
        let result = load_from(&self_path, None, None);
        assert!(result.is_err());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("circular"));
    }

    #[test]
    fn agent_section_parses_sandbox_and_tools() {
        let dir = TempDir::new().unwrap();
        let toml_content = format!(
            "{BASE_TOML}\n[agents.assistant]\nworkspace = \"agents/assistant\"\nmodel = \"gemini-2.5-flash\"\ntools = [\"shell\", \"memory\"]\nsandbox = \"restricted\"\n"
        );
        let path = write_named(&dir, "cfg.toml", &toml_content);
        let cfg = load_from(&path, None, None).unwrap();
        let agent = cfg.agent("assistant").expect("agent present");
        assert_eq!(agent.sandbox, SandboxMode::Restricted);
        assert!(agent.tools.contains("shell"));
        assert!(!agent.tools.contains("task"));
    }

    #[test]
    fn disabled_agent_is_excluded() {
        let dir = TempDir::new().unwrap();
        let toml_content = format!(
            "{BASE_TOML}\n[agents.assistant]\nenabled = false\nworkspace = \"agents/assistant\"\n"
        );
        let path = write_named(&dir, "cfg.toml", &toml_content);
        let cfg = load_from(&path, None, None).unwrap();
        assert!(cfg.agent("assistant").is_none());
    }
}
