//! Araliya Bot — supervisor entry point.
//!
//! Invoked with no arguments, runs as the daemon: loads config, starts
//! every configured agent, the chat channel adapters, and the heartbeat,
//! and blocks until Ctrl-C/SIGTERM. Invoked as `--agent-worker <id>`, this
//! is instead the re-exec'd child for that one agent: it speaks NDJSON
//! `WorkerRequest`/`WorkerReply` envelopes over stdin/stdout and never
//! touches the chat channels directly.

mod accounting;
mod channels;
mod config;
mod context;
mod daemon;
mod envelope;
mod error;
mod heartbeat;
mod llm;
mod logger;
mod registry;
mod sandbox;
mod shell;
mod supervisor;
mod worker;
mod workspace;

use tokio_util::sync::CancellationToken;
use tracing::info;

use error::AppError;

fn main() {
    let mut args = std::env::args().skip(1);
    let agent_worker_id = match args.next().as_deref() {
        Some("--agent-worker") => args.next(),
        _ => None,
    };

    let result = match agent_worker_id {
        Some(agent_id) => run_worker(agent_id),
        None => run_daemon(),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run_daemon() -> Result<(), AppError> {
    let _ = dotenvy::dotenv();

    let config = config::load(None)?;
    logger::init(&config.global.log_level, true)?;

    info!(
        default_agent = %config.global.default_agent,
        agents = config.agents.len(),
        "config loaded"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().map_err(AppError::Io)?;

    runtime.block_on(async move {
        let exe_path = std::env::current_exe()?;
        let shutdown = CancellationToken::new();

        let signal_task = tokio::spawn(daemon::wait_for_shutdown_signal(shutdown.clone()));
        let result = daemon::Daemon::new(config, exe_path).run(shutdown).await;
        signal_task.abort();
        result
    })
}

fn run_worker(agent_id: String) -> Result<(), AppError> {
    let _ = dotenvy::dotenv();

    let config = config::load(None)?;
    logger::init(&config.global.log_level, true)?;

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(AppError::Io)?;
    runtime.block_on(worker::run(agent_id, config))
}
