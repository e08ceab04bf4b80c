//! Agent worker: the LLM conversation loop that runs inside a re-exec'd
//! child process, driven over stdin/stdout by [`crate::envelope`].

pub mod system_prompt;
pub mod tools;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::accounting::TokenCounter;
use crate::config::{AgentConfig, Config};
use crate::context::ContextManager;
use crate::envelope::{encode_line, WorkerReply, WorkerRequest};
use crate::error::AppError;
use crate::llm::{ChatRequest, LlmProvider, Message, ToolChoice};
use crate::sandbox::SandboxEnforcer;
use crate::shell::ShellExecutor;
use crate::workspace::{self, MemoryStore};

const MAX_TOOL_ROUNDS: usize = 10;

pub struct AgentWorker {
    agent_id: String,
    agent: AgentConfig,
    config: Config,
    model: String,
    context: ContextManager,
    memory: MemoryStore,
    token_counter: TokenCounter,
    shell: ShellExecutor,
    llm: Option<LlmProvider>,
}

impl AgentWorker {
    pub fn new(agent_id: String, config: Config) -> Result<Self, AppError> {
        let agent = config
            .agent(&agent_id)
            .cloned()
            .ok_or_else(|| AppError::Config(format!("unknown agent id: {agent_id}")))?;

        workspace::init_agent_workspace(&agent.workspace, &agent.name, &agent.human_name)?;

        let sandbox = SandboxEnforcer::new(agent.sandbox, &agent.workspace);
        let shell = ShellExecutor::new(config.shell.clone(), sandbox, &agent.workspace);
        let memory = MemoryStore::new(&agent.workspace);
        let token_counter = TokenCounter::new(agent_id.clone(), &agent.workspace);
        let model = agent.model.clone();
        let context = ContextManager::new(config.context.clone());

        Ok(Self { agent_id, agent, config, model, context, memory, token_counter, shell, llm: None })
    }

    fn ensure_llm(&mut self) -> Result<&LlmProvider, AppError> {
        if self.llm.is_none() {
            let provider_name = crate::registry::resolve_provider(&self.model, &self.config.llm.default_provider);
            let provider_config = self.config.llm.providers.get(&provider_name);
            let provider = crate::llm::providers::build(&provider_name, provider_config)
                .map_err(|e| AppError::Config(format!("failed to build LLM provider '{provider_name}': {e}")))?;
            self.llm = Some(provider);
        }
        Ok(self.llm.as_ref().expect("just initialized"))
    }

    async fn handle_tool_call(&self, name: &str, arguments: &serde_json::Value) -> String {
        tracing::info!(tool = name, "tool call");

        match name {
            "execute_shell" => {
                let command = arguments.get("command").and_then(|v| v.as_str()).unwrap_or("");
                let result = self.shell.execute(command).await;
                if result.needs_confirmation {
                    return format!(
                        "This command requires user confirmation: `{command}`\nPlease ask the user to confirm before executing."
                    );
                }
                let mut output = String::new();
                if !result.stdout.is_empty() {
                    output.push_str(&format!("stdout:\n{}\n", result.stdout));
                }
                if !result.stderr.is_empty() {
                    output.push_str(&format!("stderr:\n{}\n", result.stderr));
                }
                output.push_str(&format!("exit_code: {}", result.exit_code));
                output
            }
            "read_memory" => {
                let content = self.memory.read();
                if content.is_empty() { "(memory is empty)".to_string() } else { content }
            }
            "write_memory" => {
                let content = arguments.get("content").and_then(|v| v.as_str()).unwrap_or("");
                let mode = arguments.get("mode").and_then(|v| v.as_str()).unwrap_or("append");
                let success = if mode == "overwrite" { self.memory.write(content) } else { self.memory.append(content) };
                if success { "Memory updated.".to_string() } else { "Failed to update memory.".to_string() }
            }
            "read_tasks" => {
                let content = workspace::load_task(&self.agent.workspace);
                if content.is_empty() { "(no tasks)".to_string() } else { content }
            }
            other => format!("Unknown tool: {other}"),
        }
    }

    /// Run one user turn through the LLM, dispatching any tool calls it
    /// requests, up to `MAX_TOOL_ROUNDS` rounds.
    pub async fn process_message(&mut self, user_message: &str, source: &str) -> Result<String, AppError> {
        self.ensure_llm()?;

        let rules_content = workspace::load_rules(&self.agent.workspace);
        let skills_content = workspace::load_skills(&self.agent.workspace);
        let memory_content = self.memory.read();
        let prompt = system_prompt::build_system_prompt(
            &self.agent_id,
            &self.agent,
            &self.config.shell,
            &skills_content,
            &memory_content,
            &rules_content,
        );
        self.context.set_system_prompt(prompt);
        self.context.add_message(Message::user(user_message));

        if self.context.needs_compression() {
            let provider = self.llm.as_ref().expect("ensured above").clone();
            self.context.compress(&provider).await;
        }

        let enabled_tools = tools::tools_for(&self.agent.tools);
        tracing::info!(from = source, "processing message");

        for _ in 0..MAX_TOOL_ROUNDS {
            let messages = self.context.messages();
            let provider = self.llm.as_ref().expect("ensured above");
            let chat_req = ChatRequest {
                messages: &messages,
                model: &self.model,
                temperature: self.config.llm.temperature,
                max_output_tokens: self.config.llm.max_output_tokens,
                tools: &enabled_tools,
                tool_choice: ToolChoice::Auto,
            };

            let response = match provider.chat(chat_req).await {
                Ok(response) => response,
                Err(e) => return Ok(format!("\u{274c} Error: {e}")),
            };

            self.token_counter.record(&self.model, response.input_tokens, response.output_tokens);

            if response.tool_calls.is_empty() {
                if !response.content.is_empty() {
                    self.context.add_message(Message::assistant(response.content.clone()));
                }
                return Ok(response.content);
            }

            let call_names: Vec<&str> = response.tool_calls.iter().map(|tc| tc.name.as_str()).collect();
            let assistant_msg = if response.content.is_empty() {
                format!("[Calling tools: {}]", call_names.join(", "))
            } else {
                response.content.clone()
            };
            self.context.add_message(Message::assistant(assistant_msg));

            for tc in &response.tool_calls {
                let result = self.handle_tool_call(&tc.name, &tc.arguments).await;
                self.context.add_message(Message::tool_result(&tc.name, &tc.id, result));
            }
        }

        Ok("Maximum tool call rounds reached. Please try again.".to_string())
    }
}

/// Re-exec entry point: read `WorkerRequest` NDJSON lines from stdin,
/// write `WorkerReply` NDJSON lines to stdout, until `Shutdown` or EOF.
pub async fn run(agent_id: String, config: Config) -> Result<(), AppError> {
    let mut worker = AgentWorker::new(agent_id, config)?;

    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => return Err(AppError::Io(e)),
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: WorkerRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse worker request, skipping");
                continue;
            }
        };

        match request {
            WorkerRequest::Message { request_id, content, source } => {
                let reply = match worker.process_message(&content, &source).await {
                    Ok(text) => WorkerReply::Reply { request_id, content: text },
                    Err(e) => WorkerReply::Error { request_id, message: e.to_string() },
                };
                write_reply(&mut stdout, &reply).await?;
            }
            WorkerRequest::SetModel { request_id, model } => {
                worker.model = model.clone();
                worker.llm = None;
                worker
                    .context
                    .add_message(Message::system(format!("[System] Model switched to: {model}. You are now running as {model}.")));
                write_reply(&mut stdout, &WorkerReply::Ack { request_id }).await?;
            }
            WorkerRequest::ResetContext { request_id } => {
                worker.context.reset();
                write_reply(&mut stdout, &WorkerReply::Ack { request_id }).await?;
            }
            WorkerRequest::GetStats { request_id } => {
                let stats = worker.context.stats();
                write_reply(&mut stdout, &WorkerReply::Stats { request_id, stats }).await?;
            }
            WorkerRequest::Shutdown => break,
        }
    }

    Ok(())
}

async fn write_reply(stdout: &mut (impl AsyncWriteExt + Unpin), reply: &WorkerReply) -> Result<(), AppError> {
    let line = encode_line(reply).map_err(|e| AppError::Config(format!("failed to encode worker reply: {e}")))?;
    stdout.write_all(line.as_bytes()).await.map_err(AppError::Io)?;
    stdout.flush().await.map_err(AppError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::test_default(dir);
        config.agents.get_mut("echo").unwrap().tools =
            ["shell", "memory", "task"].into_iter().map(String::from).collect();
        config
    }

    #[tokio::test]
    async fn process_message_echoes_via_dummy_provider() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let mut worker = AgentWorker::new("echo".to_string(), config).unwrap();
        let reply = worker.process_message("hello there", "test").await.unwrap();
        assert!(reply.contains("hello there"));
    }

    #[tokio::test]
    async fn handle_tool_call_read_memory_reports_empty() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let worker = AgentWorker::new("echo".to_string(), config).unwrap();
        let result = worker.handle_tool_call("read_memory", &serde_json::json!({})).await;
        assert_eq!(result, "(memory is empty)");
    }

    #[tokio::test]
    async fn handle_tool_call_write_then_read_memory() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let worker = AgentWorker::new("echo".to_string(), config).unwrap();
        let write_result = worker
            .handle_tool_call("write_memory", &serde_json::json!({"content": "remember this", "mode": "overwrite"}))
            .await;
        assert_eq!(write_result, "Memory updated.");
        let read_result = worker.handle_tool_call("read_memory", &serde_json::json!({})).await;
        assert_eq!(read_result, "remember this");
    }

    #[tokio::test]
    async fn handle_tool_call_unknown_tool() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let worker = AgentWorker::new("echo".to_string(), config).unwrap();
        let result = worker.handle_tool_call("nonexistent", &serde_json::json!({})).await;
        assert_eq!(result, "Unknown tool: nonexistent");
    }

    #[test]
    fn new_worker_fails_for_unknown_agent() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let err = AgentWorker::new("nope".to_string(), config);
        assert!(err.is_err());
    }

    #[test]
    fn new_worker_creates_workspace_files() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let workspace = config.agent("echo").unwrap().workspace.clone();
        let _worker = AgentWorker::new("echo".to_string(), config).unwrap();
        assert!(PathBuf::from(&workspace).join("rules.md").exists());
    }
}
