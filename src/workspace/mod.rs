//! Memory and rules store: the plain-text files an agent's workspace is
//! built from (`memory.md`, `rules.md`, `skills.md`, `task.md`).
//!
//! All I/O here is best-effort — a missing or unreadable file degrades to
//! an empty string rather than failing the caller, since none of these
//! files are required for an agent to function.

use std::path::{Path, PathBuf};

use chrono::Utc;

pub struct MemoryStore {
    memory_file: PathBuf,
}

impl MemoryStore {
    pub fn new(workspace: &Path) -> Self {
        Self { memory_file: workspace.join("memory.md") }
    }

    pub fn read(&self) -> String {
        std::fs::read_to_string(&self.memory_file).unwrap_or_default()
    }

    pub fn write(&self, content: &str) -> bool {
        self.ensure_parent_and(|| std::fs::write(&self.memory_file, content))
    }

    /// Append a timestamped entry, as the agent's `write_memory` tool does
    /// for incremental notes rather than full overwrites.
    pub fn append(&self, entry: &str) -> bool {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let block = format!("\n### [{timestamp}]\n{entry}\n");
        self.ensure_parent_and(|| {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&self.memory_file)?;
            file.write_all(block.as_bytes())
        })
    }

    /// Case-insensitive substring search over memory lines.
    pub fn search(&self, keyword: &str) -> Vec<String> {
        let content = self.read();
        if content.is_empty() {
            return Vec::new();
        }
        let needle = keyword.to_lowercase();
        content.lines().filter(|line| line.to_lowercase().contains(&needle)).map(String::from).collect()
    }

    pub fn clear(&self) -> bool {
        self.write("")
    }

    fn ensure_parent_and(&self, op: impl FnOnce() -> std::io::Result<()>) -> bool {
        if let Some(parent) = self.memory_file.parent()
            && std::fs::create_dir_all(parent).is_err()
        {
            return false;
        }
        op().is_ok()
    }
}

pub fn load_rules(workspace: &Path) -> String {
    std::fs::read_to_string(workspace.join("rules.md")).unwrap_or_default()
}

pub fn load_skills(workspace: &Path) -> String {
    std::fs::read_to_string(workspace.join("skills.md")).unwrap_or_default()
}

pub fn load_task(workspace: &Path) -> String {
    std::fs::read_to_string(workspace.join("task.md")).unwrap_or_default()
}

/// Parse `task.md` for unchecked `- [ ] ...` lines.
pub fn pending_tasks(workspace: &Path) -> Vec<String> {
    let content = load_task(workspace);
    content
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            trimmed.strip_prefix("- [ ]").map(str::trim).filter(|t| !t.is_empty()).map(String::from)
        })
        .collect()
}

/// Create a fresh agent workspace with default `rules.md`/`skills.md`/
/// `memory.md`/`task.md`, leaving any existing files untouched.
pub fn init_agent_workspace(workspace: &Path, agent_name: &str, human_name: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(workspace)?;

    let rules_file = workspace.join("rules.md");
    if !rules_file.exists() {
        std::fs::write(
            &rules_file,
            format!(
                "# Agent Rules\n\n\
                 ## Identity\n\n\
                 - You are **{agent_name}**, a helpful personal AI assistant.\n\
                 - You refer to the user as **{human_name}**.\n\n\
                 ## Behavior\n\n\
                 - Be concise and direct in your responses.\n\
                 - When executing shell commands, explain what you're doing before running them.\n\
                 - Always ask for confirmation before performing destructive operations.\n\
                 - Use the user's preferred language for communication.\n"
            ),
        )?;
    }

    let skills_file = workspace.join("skills.md");
    if !skills_file.exists() {
        std::fs::write(
            &skills_file,
            "# Skills\n\n\
             <!-- Define agent-specific skills and workflows here. -->\n\
             <!-- The agent will load these skills as reference during conversations. -->\n",
        )?;
    }

    let memory_file = workspace.join("memory.md");
    if !memory_file.exists() {
        std::fs::write(&memory_file, "")?;
    }

    let task_file = workspace.join("task.md");
    if !task_file.exists() {
        std::fs::write(&task_file, "# Tasks\n\n<!-- Add tasks as: - [ ] task description -->\n")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn read_missing_memory_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());
        assert_eq!(store.read(), "");
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());
        assert!(store.write("hello world"));
        assert_eq!(store.read(), "hello world");
    }

    #[test]
    fn append_adds_timestamped_block() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());
        assert!(store.append("remember this"));
        let content = store.read();
        assert!(content.contains("remember this"));
        assert!(content.contains("###"));
    }

    #[test]
    fn search_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());
        store.write("The Quick Brown Fox\nSecond line");
        let hits = store.search("quick");
        assert_eq!(hits, vec!["The Quick Brown Fox".to_string()]);
    }

    #[test]
    fn clear_empties_memory() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new(dir.path());
        store.write("something");
        assert!(store.clear());
        assert_eq!(store.read(), "");
    }

    #[test]
    fn pending_tasks_parses_checkboxes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("task.md"), "- [ ] buy milk\n- [x] done thing\n- [ ] call dentist\n").unwrap();
        let tasks = pending_tasks(dir.path());
        assert_eq!(tasks, vec!["buy milk".to_string(), "call dentist".to_string()]);
    }

    #[test]
    fn init_workspace_creates_default_files() {
        let dir = TempDir::new().unwrap();
        let ws = dir.path().join("agent1");
        init_agent_workspace(&ws, "Araliya", "Human").unwrap();
        assert!(ws.join("rules.md").exists());
        assert!(ws.join("skills.md").exists());
        assert!(ws.join("memory.md").exists());
        assert!(ws.join("task.md").exists());
        assert!(load_rules(&ws).contains("Araliya"));
    }

    #[test]
    fn init_workspace_does_not_overwrite_existing() {
        let dir = TempDir::new().unwrap();
        let ws = dir.path().join("agent1");
        std::fs::create_dir_all(&ws).unwrap();
        std::fs::write(ws.join("memory.md"), "preserved").unwrap();
        init_agent_workspace(&ws, "Araliya", "Human").unwrap();
        assert_eq!(std::fs::read_to_string(ws.join("memory.md")).unwrap(), "preserved");
    }
}
