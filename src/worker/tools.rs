//! Tool definitions an agent worker can expose to its LLM, gated per-agent
//! by the `tools` config list (`shell`, `memory`, `task`).

use std::collections::HashSet;

use serde_json::json;

use crate::llm::ToolDefinition;

pub fn shell_tool() -> ToolDefinition {
    ToolDefinition {
        name: "execute_shell".to_string(),
        description: "Execute a shell command on the local system. Returns stdout, stderr, and exit code.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The shell command to execute." }
            },
            "required": ["command"]
        }),
    }
}

pub fn memory_read_tool() -> ToolDefinition {
    ToolDefinition {
        name: "read_memory".to_string(),
        description: "Read the agent's persistent memory file.".to_string(),
        parameters: json!({ "type": "object", "properties": {} }),
    }
}

pub fn memory_write_tool() -> ToolDefinition {
    ToolDefinition {
        name: "write_memory".to_string(),
        description: "Write or append to the agent's persistent memory file.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "Content to write to memory." },
                "mode": {
                    "type": "string",
                    "enum": ["overwrite", "append"],
                    "description": "Write mode: 'overwrite' replaces all content, 'append' adds to the end."
                }
            },
            "required": ["content"]
        }),
    }
}

pub fn task_read_tool() -> ToolDefinition {
    ToolDefinition {
        name: "read_tasks".to_string(),
        description: "Read the agent's task list from task.md.".to_string(),
        parameters: json!({ "type": "object", "properties": {} }),
    }
}

/// Resolve the agent's enabled tool groups (`shell`/`memory`/`task`) into
/// the concrete tool definitions to advertise to the LLM.
pub fn tools_for(enabled: &HashSet<String>) -> Vec<ToolDefinition> {
    let mut tools = Vec::new();
    if enabled.contains("shell") {
        tools.push(shell_tool());
    }
    if enabled.contains("memory") {
        tools.push(memory_read_tool());
        tools.push(memory_write_tool());
    }
    if enabled.contains("task") {
        tools.push(task_read_tool());
    }
    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_groups_enabled_yields_four_tools() {
        let enabled: HashSet<String> = ["shell", "memory", "task"].into_iter().map(String::from).collect();
        assert_eq!(tools_for(&enabled).len(), 4);
    }

    #[test]
    fn no_groups_enabled_yields_no_tools() {
        assert!(tools_for(&HashSet::new()).is_empty());
    }

    #[test]
    fn shell_only() {
        let enabled: HashSet<String> = ["shell"].into_iter().map(String::from).collect();
        let tools = tools_for(&enabled);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "execute_shell");
    }
}
