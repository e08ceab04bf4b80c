//! Daemon orchestrator: wires config, the agent supervisor, channel
//! adapters, and the heartbeat together, and owns the top-level shutdown
//! signal.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::channels::{self, ChannelRouter};
use crate::config::Config;
use crate::error::AppError;
use crate::heartbeat::{self, TasksFound};
use crate::supervisor::AgentSupervisor;

pub struct Daemon {
    config: Arc<Config>,
    supervisor: Arc<Mutex<AgentSupervisor>>,
}

impl Daemon {
    pub fn new(config: Config, exe_path: PathBuf) -> Self {
        let (notify_tx, _notify_rx) = mpsc::channel(32);
        let supervisor = Arc::new(Mutex::new(AgentSupervisor::new(exe_path, notify_tx)));
        Self { config: Arc::new(config), supervisor }
    }

    /// Run the daemon until `shutdown` is cancelled (e.g. by Ctrl-C or a
    /// crash-recovery loop deciding to give up). Returns once every
    /// subtask — channels, heartbeat, crash recovery — has wound down.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), AppError> {
        write_pid_file(&self.config.global.pid_file)?;
        info!(work_dir = %self.config.global.data_dir.display(), "daemon starting");

        self.supervisor.lock().await.start_all(&self.config).await;

        let router = ChannelRouter::new(self.config.clone(), self.supervisor.clone());
        let (tasks_tx, mut tasks_rx) = mpsc::channel::<TasksFound>(32);

        let telegram_task = tokio::spawn(channels::telegram::run(router.clone(), shutdown.clone()));
        let discord_task = tokio::spawn(channels::discord::run(router.clone(), shutdown.clone()));
        let heartbeat_task = tokio::spawn({
            let config = self.config.clone();
            let shutdown = shutdown.clone();
            async move { heartbeat::run(&config, tasks_tx, shutdown).await }
        });

        let recovery_task = tokio::spawn(crash_recovery_loop(self.config.clone(), self.supervisor.clone(), shutdown.clone()));

        let tasks_forwarder = tokio::spawn({
            let supervisor = self.supervisor.clone();
            let shutdown = shutdown.clone();
            async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        found = tasks_rx.recv() => {
                            let Some(found) = found else { break };
                            forward_pending_tasks(&supervisor, found).await;
                        }
                    }
                }
            }
        });

        shutdown.cancelled().await;
        info!("daemon shutting down");

        let _ = tokio::join!(telegram_task, discord_task, heartbeat_task, recovery_task, tasks_forwarder);

        self.supervisor.lock().await.stop_all().await;
        remove_pid_file(&self.config.global.pid_file);

        info!("daemon stopped");
        Ok(())
    }
}

async fn forward_pending_tasks(supervisor: &Arc<Mutex<AgentSupervisor>>, found: TasksFound) {
    let summary = format!(
        "[Heartbeat] You have {} pending task(s) in task.md:\n{}",
        found.tasks.len(),
        found.tasks.iter().map(|t| format!("- {t}")).collect::<Vec<_>>().join("\n")
    );
    let supervisor = supervisor.lock().await;
    if let Err(e) = supervisor.send_message(&found.agent_id, summary, "heartbeat").await {
        warn!(agent_id = %found.agent_id, error = %e, "failed to deliver heartbeat nudge");
    }
}

async fn crash_recovery_loop(config: Arc<Config>, supervisor: Arc<Mutex<AgentSupervisor>>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(30));
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let restarted = supervisor.lock().await.recover_crashed(&config).await;
                if !restarted.is_empty() {
                    warn!(?restarted, "recovered crashed agents");
                }
            }
        }
    }
}

/// Run the blocking top-level signal wait and cancel `shutdown` once a
/// Ctrl-C/SIGTERM arrives.
pub async fn wait_for_shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    shutdown.cancel();
}

fn write_pid_file(path: &std::path::Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, std::process::id().to_string())?;
    Ok(())
}

fn remove_pid_file(path: &std::path::Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(error = %e, "failed to remove pid file");
    }
}
