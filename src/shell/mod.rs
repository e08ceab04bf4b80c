//! Shell executor: runs agent-issued shell commands with safety checks,
//! sandbox enforcement, and a rotating `.shell_history` log.

use std::{
    path::PathBuf,
    time::Duration,
};

use chrono::Utc;
use tokio::process::Command;

use crate::config::ShellConfig;
use crate::sandbox::SandboxEnforcer;

/// Base commands whose non-flag arguments are write targets rather than
/// read targets, for `check_file_access`'s read/write distinction.
const WRITE_COMMANDS: &[&str] = &["rm", "mv", "cp", "touch", "tee", "mkdir", "rmdir", "truncate", "ln"];

#[derive(Debug, Clone, PartialEq)]
pub struct ShellResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub blocked: bool,
    pub needs_confirmation: bool,
}

impl ShellResult {
    fn blocked(command: &str, reason: String) -> Self {
        Self {
            command: command.to_string(),
            exit_code: -1,
            stdout: String::new(),
            stderr: reason,
            timed_out: false,
            blocked: true,
            needs_confirmation: false,
        }
    }

    fn needs_confirmation(command: &str) -> Self {
        Self {
            command: command.to_string(),
            exit_code: -1,
            stdout: String::new(),
            stderr: "this command requires user confirmation before execution".to_string(),
            timed_out: false,
            blocked: false,
            needs_confirmation: true,
        }
    }
}

pub struct ShellExecutor {
    config: ShellConfig,
    sandbox: SandboxEnforcer,
    history_file: PathBuf,
}

impl ShellExecutor {
    pub fn new(config: ShellConfig, sandbox: SandboxEnforcer, workspace: &std::path::Path) -> Self {
        Self { config, sandbox, history_file: workspace.join(".shell_history") }
    }

    /// Safety check prior to execution. Returns `Some(result)` if the
    /// command must not run (blocked or awaiting confirmation), `None` if
    /// it's clear to execute.
    pub fn check_command(&self, command: &str) -> Option<ShellResult> {
        for blocked in &self.config.blocked_commands {
            if command.contains(blocked.as_str()) {
                return Some(ShellResult::blocked(command, format!("command blocked: contains '{blocked}'")));
            }
        }

        if self.is_dangerous(command) {
            return Some(ShellResult::needs_confirmation(command));
        }

        if let Some(violation) = self.sandbox.check_command(command) {
            return Some(ShellResult::blocked(command, format!("sandbox violation: {violation}")));
        }

        if let Some(violation) = self.check_file_args(command) {
            return Some(ShellResult::blocked(command, format!("sandbox violation: {violation}")));
        }

        None
    }

    /// Resolve path-like arguments in `command` and check each one against
    /// the sandbox's file access rules, catching writes outside the
    /// workspace that `check_command`'s string matching misses (e.g. `cp
    /// foo ~/.bashrc` has no `..` and doesn't name a protected prefix
    /// verbatim).
    fn check_file_args(&self, command: &str) -> Option<String> {
        let tokens = shell_words::split(command).unwrap_or_else(|_| command.split_whitespace().map(String::from).collect());
        let Some(base_cmd) = tokens.first() else { return None };
        let base = std::path::Path::new(base_cmd).file_name().and_then(|n| n.to_str()).unwrap_or(base_cmd.as_str());
        let write = WRITE_COMMANDS.contains(&base) || command.contains('>');

        for token in tokens.iter().skip(1) {
            if token.starts_with('-') || !token.contains('/') {
                continue;
            }
            if let Some(violation) = self.sandbox.check_file_access(std::path::Path::new(token), write) {
                return Some(violation);
            }
        }
        None
    }

    fn is_dangerous(&self, command: &str) -> bool {
        let tokens = shell_words::split(command)
            .unwrap_or_else(|_| command.split_whitespace().map(String::from).collect());
        tokens.iter().any(|t| {
            let base = std::path::Path::new(t).file_name().and_then(|n| n.to_str()).unwrap_or(t.as_str());
            self.config.dangerous_commands.contains(base)
        })
    }

    /// Run the command, recording it to history regardless of outcome.
    pub async fn execute(&self, command: &str) -> ShellResult {
        if let Some(check) = self.check_command(command) {
            self.record_history(&check);
            return check;
        }

        let cwd = self.sandbox.cwd();
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(&cwd);

        let result = match tokio::time::timeout(Duration::from_secs(self.config.timeout_seconds), cmd.output()).await
        {
            Ok(Ok(output)) => {
                let stdout = truncate(&String::from_utf8_lossy(&output.stdout), self.config.max_output_chars);
                let stderr = truncate(&String::from_utf8_lossy(&output.stderr), self.config.max_output_chars);
                ShellResult {
                    command: command.to_string(),
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout,
                    stderr,
                    timed_out: false,
                    blocked: false,
                    needs_confirmation: false,
                }
            }
            Ok(Err(e)) => ShellResult {
                command: command.to_string(),
                exit_code: -1,
                stdout: String::new(),
                stderr: format!("execution error: {e}"),
                timed_out: false,
                blocked: false,
                needs_confirmation: false,
            },
            Err(_) => ShellResult {
                command: command.to_string(),
                exit_code: -1,
                stdout: String::new(),
                stderr: format!("command timed out after {} seconds", self.config.timeout_seconds),
                timed_out: true,
                blocked: false,
                needs_confirmation: false,
            },
        };

        self.record_history(&result);
        result
    }

    fn record_history(&self, result: &ShellResult) {
        if let Err(e) = self.try_record_history(result) {
            tracing::debug!(error = %e, "failed to record shell history");
        }
    }

    fn try_record_history(&self, result: &ShellResult) -> std::io::Result<()> {
        if let Some(parent) = self.history_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
        let mut entry = format!("[{timestamp}] $ {}\nexit_code: {}\n", result.command, result.exit_code);

        if result.blocked {
            entry.push_str(&format!("blocked: {}\n", result.stderr));
        } else if result.needs_confirmation {
            entry.push_str("status: needs_confirmation\n");
        } else if self.config.history_record_output {
            if !result.stdout.is_empty() {
                entry.push_str(&format!("stdout: {}\n", truncate(&result.stdout, self.config.history_output_max_chars)));
            }
            if !result.stderr.is_empty() {
                entry.push_str(&format!("stderr: {}\n", truncate(&result.stderr, self.config.history_output_max_chars)));
            }
        }
        entry.push_str("---\n");

        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&self.history_file)?;
        file.write_all(entry.as_bytes())?;

        self.truncate_history_if_needed()
    }

    fn truncate_history_if_needed(&self) -> std::io::Result<()> {
        let metadata = std::fs::metadata(&self.history_file)?;
        let max_bytes = self.config.history_max_file_size_mb * 1024 * 1024;
        if metadata.len() <= max_bytes {
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.history_file)?;
        let lines: Vec<&str> = content.lines().collect();
        let keep_from = lines.len() / 3;
        let kept = lines[keep_from..].join("\n") + "\n";
        std::fs::write(&self.history_file, kept)
    }
}

fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit { s.to_string() } else { s.chars().take(limit).collect() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxMode;
    use tempfile::TempDir;

    fn test_config() -> ShellConfig {
        ShellConfig {
            timeout_seconds: 5,
            max_output_chars: 10_000,
            dangerous_commands: ["rm", "sudo"].into_iter().map(String::from).collect(),
            blocked_commands: vec!["rm -rf /".to_string()],
            history_max_entries: 1000,
            history_max_file_size_mb: 1,
            history_record_output: true,
            history_output_max_chars: 500,
        }
    }

    fn executor(dir: &TempDir, mode: SandboxMode) -> ShellExecutor {
        let sandbox = SandboxEnforcer::new(mode, dir.path());
        ShellExecutor::new(test_config(), sandbox, dir.path())
    }

    #[tokio::test]
    async fn executes_echo_and_returns_stdout() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, SandboxMode::Confined);
        let result = exec.execute("echo hello").await;
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn blocked_command_never_runs() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, SandboxMode::Confined);
        let result = exec.execute("rm -rf / --no-preserve-root").await;
        assert!(result.blocked);
    }

    #[tokio::test]
    async fn dangerous_command_needs_confirmation() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, SandboxMode::Confined);
        let result = exec.execute("sudo reboot").await;
        assert!(result.needs_confirmation);
    }

    #[tokio::test]
    async fn write_outside_workspace_is_blocked() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, SandboxMode::Confined);
        let result = exec.execute("cp notes.txt /var/tmp/notes.txt").await;
        assert!(result.blocked);
    }

    #[tokio::test]
    async fn sandbox_violation_is_blocked() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, SandboxMode::Restricted);
        let result = exec.execute("curl http://example.com").await;
        assert!(result.blocked);
    }

    #[tokio::test]
    async fn timeout_marks_result() {
        let dir = TempDir::new().unwrap();
        let mut cfg = test_config();
        cfg.timeout_seconds = 1;
        let sandbox = SandboxEnforcer::new(SandboxMode::Confined, dir.path());
        let exec = ShellExecutor::new(cfg, sandbox, dir.path());
        let result = exec.execute("sleep 5").await;
        assert!(result.timed_out);
    }

    #[tokio::test]
    async fn history_file_is_written() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, SandboxMode::Confined);
        exec.execute("echo hi").await;
        let history = std::fs::read_to_string(dir.path().join(".shell_history")).unwrap();
        assert!(history.contains("echo hi"));
    }

    #[test]
    fn truncate_respects_char_limit() {
        assert_eq!(truncate("hello world", 5), "hello");
        assert_eq!(truncate("short", 100), "short");
    }
}
