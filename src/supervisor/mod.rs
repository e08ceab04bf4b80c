//! Agent supervisor: owns one re-exec'd child process per configured
//! agent and multiplexes [`WorkerRequest`]/[`WorkerReply`] traffic over
//! each child's stdin/stdout.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

const RPC_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

use crate::config::{AgentConfig, Config};
use crate::envelope::{encode_line, WorkerReply, WorkerRequest};
use crate::error::AppError;
use crate::workspace;

type PendingReplies = HashMap<String, oneshot::Sender<WorkerReply>>;

/// Unsolicited message a worker wants surfaced, with no request to
/// correlate it to (e.g. a heartbeat-driven proactive note).
pub type Notification = (String, String);

struct AgentHandle {
    child: Child,
    request_tx: mpsc::Sender<(WorkerRequest, oneshot::Sender<WorkerReply>)>,
    io_task: JoinHandle<()>,
    started_at: Instant,
    restart_count: u32,
}

impl AgentHandle {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

#[derive(Debug, Clone)]
pub struct AgentStatus {
    pub agent_id: String,
    pub name: String,
    pub model: String,
    pub sandbox: String,
    pub alive: bool,
    pub pid: Option<u32>,
    pub uptime_secs: u64,
    pub restart_count: u32,
}

/// Manages the lifecycle of every configured agent's child process.
pub struct AgentSupervisor {
    exe_path: PathBuf,
    notify_tx: mpsc::Sender<Notification>,
    agents: HashMap<String, AgentHandle>,
}

impl AgentSupervisor {
    pub fn new(exe_path: PathBuf, notify_tx: mpsc::Sender<Notification>) -> Self {
        Self { exe_path, notify_tx, agents: HashMap::new() }
    }

    /// Spawn the child process for `agent_id`, stopping any existing one
    /// first. Initializes the agent's on-disk workspace before spawning.
    pub async fn start_agent(&mut self, config: &Config, agent_id: &str) -> Result<(), AppError> {
        let agent = config.agent(agent_id).ok_or_else(|| AppError::Config(format!("agent '{agent_id}' not found")))?;

        workspace::init_agent_workspace(&agent.workspace, &agent.name, &agent.human_name)?;

        if self.agents.get_mut(agent_id).is_some_and(|h| h.is_alive()) {
            self.stop_agent(agent_id).await;
        }

        let restart_count = self.agents.get(agent_id).map(|h| h.restart_count).unwrap_or(0);

        let mut child = Command::new(&self.exe_path)
            .arg("--agent-worker")
            .arg(agent_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(AppError::Io)?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");

        let (request_tx, request_rx) = mpsc::channel(32);
        let io_task = tokio::spawn(run_agent_io(agent_id.to_string(), stdin, stdout, request_rx, self.notify_tx.clone()));

        info!(%agent_id, pid = child.id(), "agent worker started");
        self.agents.insert(
            agent_id.to_string(),
            AgentHandle { child, request_tx, io_task, started_at: Instant::now(), restart_count },
        );
        Ok(())
    }

    /// Ask the agent to shut down cleanly, escalating through terminate
    /// and finally kill if it doesn't exit within each grace period.
    pub async fn stop_agent(&mut self, agent_id: &str) {
        let Some(mut handle) = self.agents.remove(agent_id) else { return };

        let _ = handle.request_tx.send((WorkerRequest::Shutdown, oneshot::channel().0)).await;
        drop(handle.request_tx);

        if tokio::time::timeout(std::time::Duration::from_secs(5), handle.child.wait()).await.is_err() {
            warn!(%agent_id, "agent did not exit gracefully, sending terminate");
            if let Some(pid) = handle.child.id() {
                let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }

            if tokio::time::timeout(std::time::Duration::from_secs(3), handle.child.wait()).await.is_err() {
                warn!(%agent_id, "agent did not terminate, killing");
                let _ = handle.child.kill().await;
            }
        }
        handle.io_task.abort();
        info!(%agent_id, "agent worker stopped");
    }

    pub async fn restart_agent(&mut self, config: &Config, agent_id: &str) -> Result<(), AppError> {
        let restart_count = self.agents.get(agent_id).map(|h| h.restart_count).unwrap_or(0);
        self.stop_agent(agent_id).await;
        self.start_agent(config, agent_id).await?;
        if let Some(handle) = self.agents.get_mut(agent_id) {
            handle.restart_count = restart_count + 1;
        }
        info!(%agent_id, restart_count = restart_count + 1, "agent worker restarted");
        Ok(())
    }

    pub async fn start_all(&mut self, config: &Config) {
        let agent_ids: Vec<String> = config.agents.keys().cloned().collect();
        for agent_id in agent_ids {
            if let Err(e) = self.start_agent(config, &agent_id).await {
                warn!(%agent_id, error = %e, "failed to start agent");
            }
        }
    }

    pub async fn stop_all(&mut self) {
        let agent_ids: Vec<String> = self.agents.keys().cloned().collect();
        for agent_id in agent_ids {
            self.stop_agent(&agent_id).await;
        }
    }

    /// Restart any agent whose process has exited unexpectedly, returning
    /// the ids that were restarted.
    pub async fn recover_crashed(&mut self, config: &Config) -> Vec<String> {
        let crashed: Vec<String> =
            self.agents.iter_mut().filter(|(_, h)| !h.is_alive()).map(|(id, _)| id.clone()).collect();

        let mut restarted = Vec::new();
        for agent_id in crashed {
            warn!(%agent_id, "agent crashed, restarting");
            if self.restart_agent(config, &agent_id).await.is_ok() {
                restarted.push(agent_id);
            }
        }
        restarted
    }

    /// Deliver an inbound chat message to an agent and await its reply.
    pub async fn send_message(&self, agent_id: &str, content: String, source: &str) -> Result<WorkerReply, AppError> {
        let handle = self.agents.get(agent_id).ok_or_else(|| AppError::Agent(format!("agent '{agent_id}' is not running")))?;

        let request_id = Uuid::new_v4().to_string();
        let request = WorkerRequest::Message { request_id, content, source: source.to_string() };
        self.dispatch(handle, request).await
    }

    pub async fn set_model(&self, agent_id: &str, model: String) -> Result<WorkerReply, AppError> {
        let handle = self.agents.get(agent_id).ok_or_else(|| AppError::Agent(format!("agent '{agent_id}' is not running")))?;
        let request = WorkerRequest::SetModel { request_id: Uuid::new_v4().to_string(), model };
        self.dispatch(handle, request).await
    }

    pub async fn reset_context(&self, agent_id: &str) -> Result<WorkerReply, AppError> {
        let handle = self.agents.get(agent_id).ok_or_else(|| AppError::Agent(format!("agent '{agent_id}' is not running")))?;
        let request = WorkerRequest::ResetContext { request_id: Uuid::new_v4().to_string() };
        self.dispatch(handle, request).await
    }

    pub async fn get_stats(&self, agent_id: &str) -> Result<WorkerReply, AppError> {
        let handle = self.agents.get(agent_id).ok_or_else(|| AppError::Agent(format!("agent '{agent_id}' is not running")))?;
        let request = WorkerRequest::GetStats { request_id: Uuid::new_v4().to_string() };
        self.dispatch(handle, request).await
    }

    async fn dispatch(&self, handle: &AgentHandle, request: WorkerRequest) -> Result<WorkerReply, AppError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .request_tx
            .send((request, reply_tx))
            .await
            .map_err(|_| AppError::Agent("agent worker channel closed".to_string()))?;

        tokio::time::timeout(RPC_TIMEOUT, reply_rx)
            .await
            .map_err(|_| AppError::Agent("agent worker did not reply within 10s".to_string()))?
            .map_err(|_| AppError::Agent("agent worker did not reply".to_string()))
    }

    pub fn is_running(&mut self, agent_id: &str) -> bool {
        self.agents.get_mut(agent_id).is_some_and(|h| h.is_alive())
    }

    pub fn list_agents(&mut self, config: &Config) -> Vec<AgentStatus> {
        let mut agent_configs: Vec<(&String, &AgentConfig)> = config.agents.iter().collect();
        agent_configs.sort_by_key(|(id, _)| id.as_str());

        agent_configs
            .into_iter()
            .map(|(agent_id, cfg)| {
                let (alive, pid, uptime_secs, restart_count) = match self.agents.get_mut(agent_id) {
                    Some(handle) => {
                        let pid = handle.pid();
                        let uptime_secs = handle.started_at.elapsed().as_secs();
                        let restart_count = handle.restart_count;
                        (handle.is_alive(), pid, uptime_secs, restart_count)
                    }
                    None => (false, None, 0, 0),
                };
                AgentStatus {
                    agent_id: agent_id.clone(),
                    name: cfg.name.clone(),
                    model: cfg.model.clone(),
                    sandbox: cfg.sandbox.to_string(),
                    alive,
                    pid,
                    uptime_secs,
                    restart_count,
                }
            })
            .collect()
    }
}

/// Owns one agent's child stdin/stdout. Writes outgoing requests as they
/// arrive on `request_rx`, reads reply lines from the child and routes
/// each to the oneshot waiting on its `request_id`, or to `notify_tx` for
/// unsolicited `Notify` replies.
async fn run_agent_io(
    agent_id: String,
    mut stdin: tokio::process::ChildStdin,
    stdout: tokio::process::ChildStdout,
    mut request_rx: mpsc::Receiver<(WorkerRequest, oneshot::Sender<WorkerReply>)>,
    notify_tx: mpsc::Sender<Notification>,
) {
    let mut pending: PendingReplies = HashMap::new();
    let mut lines = BufReader::new(stdout).lines();

    loop {
        tokio::select! {
            biased;

            request = request_rx.recv() => {
                let Some((request, reply_tx)) = request else { break };
                let is_shutdown = matches!(request, WorkerRequest::Shutdown);
                if let Some(id) = request.request_id() {
                    pending.insert(id.to_string(), reply_tx);
                }

                let line = match encode_line(&request) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(%agent_id, error = %e, "failed to encode worker request");
                        continue;
                    }
                };
                if stdin.write_all(line.as_bytes()).await.is_err() || stdin.flush().await.is_err() {
                    warn!(%agent_id, "failed to write to agent stdin, stopping io task");
                    break;
                }
                if is_shutdown {
                    break;
                }
            }

            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        debug!(%agent_id, "agent stdout closed");
                        break;
                    }
                    Err(e) => {
                        warn!(%agent_id, error = %e, "error reading agent stdout");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                let reply: WorkerReply = match serde_json::from_str(&line) {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!(%agent_id, error = %e, "failed to parse worker reply");
                        continue;
                    }
                };

                match reply.request_id() {
                    Some(id) => {
                        if let Some(tx) = pending.remove(id) {
                            let _ = tx.send(reply);
                        }
                    }
                    None => {
                        if let WorkerReply::Notify { content } = reply {
                            let _ = notify_tx.send((agent_id.clone(), content)).await;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_status_sandbox_is_display_string() {
        let status = AgentStatus {
            agent_id: "main".to_string(),
            name: "Araliya".to_string(),
            model: "gemini-2.5-flash".to_string(),
            sandbox: "confined".to_string(),
            alive: true,
            pid: Some(123),
            uptime_secs: 42,
            restart_count: 0,
        };
        assert_eq!(status.sandbox, "confined");
    }
}
