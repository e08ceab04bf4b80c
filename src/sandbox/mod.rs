//! Sandbox policy: classifies shell commands and file access by agent
//! sandbox level before the shell executor runs anything.
//!
//! Three levels, increasingly restrictive:
//! - `normal`: no restrictions.
//! - `confined`: network allowed, writes confined to the workspace, no
//!   process-management commands.
//! - `restricted`: same as confined plus no network commands, no reads
//!   outside the workspace.

use std::{
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::LazyLock,
};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SandboxMode {
    Normal,
    Confined,
    Restricted,
}

impl FromStr for SandboxMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "confined" => Ok(Self::Confined),
            "restricted" => Ok(Self::Restricted),
            other => Err(AppError::Config(format!(
                "unknown sandbox mode '{other}', expected one of: normal, confined, restricted"
            ))),
        }
    }
}

impl fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Normal => "normal",
            Self::Confined => "confined",
            Self::Restricted => "restricted",
        };
        write!(f, "{s}")
    }
}

static PROCESS_COMMANDS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| ["kill", "killall", "pkill", "pgrep", "renice", "nice"].into_iter().collect());

static NETWORK_COMMANDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "curl", "wget", "nc", "ncat", "netcat", "ssh", "scp", "sftp", "ftp", "telnet", "ping",
        "traceroute", "nslookup", "dig", "host",
    ]
    .into_iter()
    .collect()
});

fn protected_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("/etc/"),
        PathBuf::from("/sys/"),
        PathBuf::from("/proc/"),
        PathBuf::from("/boot/"),
        PathBuf::from("/sbin/"),
    ];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".ssh/"));
        paths.push(home.join(".config/"));
        paths.push(home.join(".gnupg/"));
    }
    paths
}

/// Split a command into tokens, shell-style; falls back to whitespace
/// splitting if the command has unbalanced quotes.
fn tokenize(command: &str) -> Vec<String> {
    shell_words::split(command).unwrap_or_else(|_| command.split_whitespace().map(String::from).collect())
}

pub struct SandboxEnforcer {
    mode: SandboxMode,
    workspace: PathBuf,
}

impl SandboxEnforcer {
    pub fn new(mode: SandboxMode, workspace: impl AsRef<Path>) -> Self {
        let workspace = workspace.as_ref().canonicalize().unwrap_or_else(|_| workspace.as_ref().to_path_buf());
        Self { mode, workspace }
    }

    pub fn mode(&self) -> SandboxMode {
        self.mode
    }

    /// Check whether `command` violates sandbox rules. Returns a human
    /// readable violation description, or `None` if it's allowed.
    pub fn check_command(&self, command: &str) -> Option<String> {
        if self.mode == SandboxMode::Normal {
            return None;
        }

        let tokens = tokenize(command);
        if tokens.is_empty() {
            return None;
        }

        let base_cmds: HashSet<&str> = tokens
            .iter()
            .map(|t| Path::new(t).file_name().and_then(|n| n.to_str()).unwrap_or(t.as_str()))
            .collect();

        let blocked_procs: Vec<&str> =
            base_cmds.iter().filter(|c| PROCESS_COMMANDS.contains(*c)).copied().collect();
        if !blocked_procs.is_empty() {
            return Some(format!(
                "process management command not allowed in {} mode: {}",
                self.mode,
                blocked_procs.join(", ")
            ));
        }

        if self.mode == SandboxMode::Restricted {
            let blocked_net: Vec<&str> =
                base_cmds.iter().filter(|c| NETWORK_COMMANDS.contains(*c)).copied().collect();
            if !blocked_net.is_empty() {
                return Some(format!("network command not allowed in restricted mode: {}", blocked_net.join(", ")));
            }
        }

        if command.contains("..") {
            return Some("path traversal (..) not allowed in sandbox mode".to_string());
        }

        for protected in protected_paths() {
            if let Some(p) = protected.to_str()
                && command.contains(p)
            {
                return Some(format!("access to protected path '{p}' not allowed in sandbox mode"));
            }
        }

        None
    }

    /// Check whether accessing `file_path` is allowed. `write` distinguishes
    /// read from write access: reads outside the workspace are tolerated in
    /// confined mode, writes never are.
    pub fn check_file_access(&self, file_path: &Path, write: bool) -> Option<String> {
        if self.mode == SandboxMode::Normal {
            return None;
        }

        let resolved = file_path.canonicalize().unwrap_or_else(|_| file_path.to_path_buf());

        if !resolved.starts_with(&self.workspace) {
            if write {
                return Some(format!(
                    "write access outside workspace not allowed in {} mode: {}",
                    self.mode,
                    file_path.display()
                ));
            }
            if self.mode == SandboxMode::Restricted {
                return Some(format!(
                    "file access outside workspace not allowed in restricted mode: {}",
                    file_path.display()
                ));
            }
        }

        for protected in protected_paths() {
            let protected_resolved = protected.canonicalize().unwrap_or(protected);
            if resolved.starts_with(&protected_resolved) {
                return Some(format!("access to protected path not allowed: {}", file_path.display()));
            }
        }

        None
    }

    /// Working directory to run commands in: the workspace for
    /// confined/restricted, the process cwd for normal.
    pub fn cwd(&self) -> PathBuf {
        match self.mode {
            SandboxMode::Confined | SandboxMode::Restricted => self.workspace.clone(),
            SandboxMode::Normal => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Human-readable summary of current restrictions, shown by `/status`.
    pub fn describe(&self) -> String {
        match self.mode {
            SandboxMode::Normal => "no restrictions, full user permissions".to_string(),
            SandboxMode::Confined => {
                "confined mode: network allowed, filesystem writes confined to workspace, \
                 process management and system files blocked"
                    .to_string()
            }
            SandboxMode::Restricted => {
                "restricted mode: network blocked, filesystem confined to workspace, \
                 process management and system files blocked"
                    .to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enforcer(mode: SandboxMode) -> SandboxEnforcer {
        SandboxEnforcer::new(mode, std::env::temp_dir())
    }

    #[test]
    fn normal_mode_allows_everything() {
        let e = enforcer(SandboxMode::Normal);
        assert!(e.check_command("kill -9 1").is_none());
        assert!(e.check_command("curl http://example.com").is_none());
    }

    #[test]
    fn confined_blocks_process_commands() {
        let e = enforcer(SandboxMode::Confined);
        assert!(e.check_command("kill -9 1234").is_some());
        assert!(e.check_command("pkill foo").is_some());
    }

    #[test]
    fn confined_allows_network() {
        let e = enforcer(SandboxMode::Confined);
        assert!(e.check_command("curl http://example.com").is_none());
    }

    #[test]
    fn restricted_blocks_network() {
        let e = enforcer(SandboxMode::Restricted);
        assert!(e.check_command("curl http://example.com").is_some());
        assert!(e.check_command("ssh host").is_some());
    }

    #[test]
    fn path_traversal_blocked_in_confined() {
        let e = enforcer(SandboxMode::Confined);
        assert!(e.check_command("cat ../../etc/passwd").is_some());
    }

    #[test]
    fn protected_path_blocked() {
        let e = enforcer(SandboxMode::Confined);
        assert!(e.check_command("cat /etc/shadow").is_some());
    }

    #[test]
    fn plain_command_allowed_in_confined() {
        let e = enforcer(SandboxMode::Confined);
        assert!(e.check_command("ls -la").is_none());
    }

    #[test]
    fn sandbox_mode_parses_from_str() {
        assert_eq!("normal".parse::<SandboxMode>().unwrap(), SandboxMode::Normal);
        assert_eq!("confined".parse::<SandboxMode>().unwrap(), SandboxMode::Confined);
        assert_eq!("restricted".parse::<SandboxMode>().unwrap(), SandboxMode::Restricted);
        assert!("bogus".parse::<SandboxMode>().is_err());
    }

    #[test]
    fn cwd_is_workspace_for_confined() {
        let ws = std::env::temp_dir();
        let e = SandboxEnforcer::new(SandboxMode::Confined, &ws);
        assert_eq!(e.cwd(), ws.canonicalize().unwrap_or(ws));
    }
}
