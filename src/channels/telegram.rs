//! Telegram channel adapter: one bot per distinct bot token (agents
//! sharing credentials route through the first agent's bot), commands
//! dispatched to [`handle_system_command`], everything else to the agent.

use std::sync::Arc;

use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{chunk_message, handle_system_command, is_user_allowed, ChannelRouter};
use crate::config::AgentChannelConfig;
use crate::error::AppError;

pub async fn run(router: ChannelRouter, shutdown: CancellationToken) -> Result<(), AppError> {
    let bindings: Vec<(String, String, AgentChannelConfig)> = super::dedupe_by_token(
        router
            .config()
            .agents
            .iter()
            .filter_map(|(id, cfg)| cfg.telegram.as_ref().map(|tg| (id.as_str(), tg))),
    )
    .into_iter()
    .map(|(token, agent_id, cfg)| (token, agent_id.to_string(), cfg.clone()))
    .collect();

    if bindings.is_empty() {
        debug!("no agents configured with a telegram channel, adapter idle");
        shutdown.cancelled().await;
        return Ok(());
    }

    let mut tasks = Vec::new();
    for (token, agent_id, channel_cfg) in bindings {
        let router = router.clone();
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(run_bot(token, agent_id, channel_cfg, router, shutdown)));
    }

    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

async fn run_bot(token: String, agent_id: String, channel_cfg: AgentChannelConfig, router: ChannelRouter, shutdown: CancellationToken) {
    info!(%agent_id, "telegram bot starting");
    let bot = Bot::new(token);
    let channel_cfg = Arc::new(channel_cfg);

    let handler = Update::filter_message().endpoint({
        let router = router.clone();
        let agent_id = agent_id.clone();
        let channel_cfg = channel_cfg.clone();
        move |bot: Bot, msg: Message| {
            let router = router.clone();
            let agent_id = agent_id.clone();
            let channel_cfg = channel_cfg.clone();
            async move {
                handle_update(bot, msg, router, agent_id, channel_cfg).await;
                respond(())
            }
        }
    });

    let mut dispatcher = Dispatcher::builder(bot, handler).build();

    tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            info!(%agent_id, "telegram bot shutting down");
        }
        _ = dispatcher.dispatch() => {
            warn!(%agent_id, "telegram dispatcher exited unexpectedly");
        }
    }
}

async fn handle_update(bot: Bot, msg: Message, router: ChannelRouter, agent_id: String, channel_cfg: Arc<AgentChannelConfig>) {
    let Some(text) = msg.text() else { return };
    let user_id = msg.from.as_ref().map(|u| u.id.0 as i64).unwrap_or(0);

    if !is_user_allowed(&channel_cfg, user_id) {
        let _ = bot.send_message(msg.chat.id, "you are not authorized to use this bot").await;
        return;
    }

    debug!(%agent_id, from = ?msg.from.as_ref().and_then(|u| u.username.clone()), "telegram message received");

    let reply = if text.starts_with('/') {
        match handle_system_command(&router, &agent_id, &channel_cfg, user_id, text).await {
            Some(reply) => reply,
            None => return,
        }
    } else {
        router.route_message(&agent_id, "telegram", text.to_string()).await
    };

    for chunk in chunk_message(&reply) {
        if let Err(e) = bot.send_message(msg.chat.id, chunk).await {
            warn!(%agent_id, error = %e, "failed to send telegram reply");
        }
    }
}
