//! Heartbeat: periodically checks an agent's `task.md` for pending
//! checkbox items and nudges the agent to act on them.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::workspace;

/// One found-pending-tasks event, delivered to the daemon so it can route
/// a synthetic message into the agent's conversation loop.
pub struct TasksFound {
    pub agent_id: String,
    pub tasks: Vec<String>,
}

/// Run heartbeat loops for every configured agent until `shutdown` fires.
/// Each agent gets its own interval timer; a quiet agent (no pending
/// tasks) costs nothing between ticks.
pub async fn run(config: &Config, tasks_tx: mpsc::Sender<TasksFound>, shutdown: CancellationToken) {
    if !config.heartbeat.enabled {
        debug!("heartbeat disabled by config");
        shutdown.cancelled().await;
        return;
    }

    let interval = Duration::from_secs(config.heartbeat.interval_seconds);
    let mut handles = Vec::new();

    for (agent_id, agent) in &config.agents {
        let agent_id = agent_id.clone();
        let workspace = agent.workspace.clone();
        let tasks_tx = tasks_tx.clone();
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(agent_loop(agent_id, workspace, interval, tasks_tx, shutdown)));
    }

    info!(agents = handles.len(), interval_secs = interval.as_secs(), "heartbeat started");
    for handle in handles {
        let _ = handle.await;
    }
}

async fn agent_loop(agent_id: String, workspace: PathBuf, interval: Duration, tasks_tx: mpsc::Sender<TasksFound>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // consume the immediate first tick, check on the real interval

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!(%agent_id, "heartbeat stopped");
                break;
            }
            _ = ticker.tick() => {
                check(&agent_id, &workspace, &tasks_tx).await;
            }
        }
    }
}

const MAX_REPORTED_TASKS: usize = 5;

async fn check(agent_id: &str, workspace: &std::path::Path, tasks_tx: &mpsc::Sender<TasksFound>) {
    let mut pending = workspace::pending_tasks(workspace);
    if pending.is_empty() {
        debug!(%agent_id, "no pending tasks, resting");
        return;
    }

    info!(%agent_id, count = pending.len(), "pending tasks found");
    pending.truncate(MAX_REPORTED_TASKS);
    if tasks_tx.send(TasksFound { agent_id: agent_id.to_string(), tasks: pending }).await.is_err() {
        warn!(%agent_id, "failed to deliver pending-tasks notification, daemon channel closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn check_sends_notification_when_tasks_pending() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("task.md"), "- [ ] water the plants\n").unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        check("agent1", dir.path(), &tx).await;
        let found = rx.try_recv().unwrap();
        assert_eq!(found.agent_id, "agent1");
        assert_eq!(found.tasks, vec!["water the plants".to_string()]);
    }

    #[tokio::test]
    async fn check_sends_nothing_when_no_tasks() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        check("agent1", dir.path(), &tx).await;
        assert!(rx.try_recv().is_err());
    }
}
