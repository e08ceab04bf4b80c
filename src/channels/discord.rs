//! Discord channel adapter: one bot per distinct bot token, guild and
//! channel allowlists in addition to the user allowlist, since Discord
//! agents are often scoped to specific servers rather than DMs.

use std::sync::Arc;

use serenity::all::{ChannelId, EventHandler, GatewayIntents, Message, Ready};
use serenity::async_trait;
use serenity::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{handle_system_command, is_channel_allowed, is_guild_allowed, is_user_allowed, ChannelRouter};
use crate::config::AgentChannelConfig;
use crate::error::AppError;

const MAX_DISCORD_MESSAGE_LENGTH: usize = 2000;

pub async fn run(router: ChannelRouter, shutdown: CancellationToken) -> Result<(), AppError> {
    let bindings: Vec<(String, String, AgentChannelConfig)> = super::dedupe_by_token(
        router
            .config()
            .agents
            .iter()
            .filter_map(|(id, cfg)| cfg.discord.as_ref().map(|dc| (id.as_str(), dc))),
    )
    .into_iter()
    .map(|(token, agent_id, cfg)| (token, agent_id.to_string(), cfg.clone()))
    .collect();

    if bindings.is_empty() {
        tracing::debug!("no agents configured with a discord channel, adapter idle");
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

struct Handler {
    agent_id: String,
    channel_cfg: Arc<AgentChannelConfig>,
    router: ChannelRouter,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: serenity::prelude::Context, ready: Ready) {
        info!(agent_id = %self.agent_id, user = %ready.user.name, "discord bot connected");
    }

    async fn message(&self, ctx: serenity::prelude::Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let text = msg.content.trim();
        if text.is_empty() {
            return;
        }

        let user_id = msg.author.id.get() as i64;
        let channel_id = msg.channel_id.get() as i64;
        let guild_id = msg.guild_id.map(|g| g.get() as i64);

        if !is_user_allowed(&self.channel_cfg, user_id) || !is_channel_allowed(&self.channel_cfg, channel_id) {
            return;
        }
        if let Some(guild_id) = guild_id
            && !is_guild_allowed(&self.channel_cfg, guild_id)
        {
            return;
        }

        let reply = if text.starts_with('/') {
            match handle_system_command(&self.router, &self.agent_id, &self.channel_cfg, user_id, text).await {
                Some(reply) => reply,
                None => return,
            }
        } else {
            self.router.route_message(&self.agent_id, "discord", text.to_string()).await
        };

        send_chunked(&ctx, msg.channel_id, &reply).await;
    }
}

async fn send_chunked(ctx: &serenity::prelude::Context, channel_id: ChannelId, text: &str) {
    let chunks: Vec<String> = text
        .chars()
        .collect::<Vec<char>>()
        .chunks(MAX_DISCORD_MESSAGE_LENGTH)
        .map(|c| c.iter().collect())
        .collect();

    for chunk in chunks {
        if let Err(e) = channel_id.say(&ctx.http, chunk).await {
            warn!(error = %e, "failed to send discord message");
        }
    }
}

async fn run_bot(token: String, agent_id: String, channel_cfg: AgentChannelConfig, router: ChannelRouter, shutdown: CancellationToken) {
    let intents = GatewayIntents::GUILD_MESSAGES | GatewayIntents::DIRECT_MESSAGES | GatewayIntents::MESSAGE_CONTENT;
    let handler = Handler { agent_id: agent_id.clone(), channel_cfg: Arc::new(channel_cfg), router };

    let mut client = match Client::builder(&token, intents).event_handler(handler).await {
        Ok(client) => client,
        Err(e) => {
            error!(%agent_id, error = %e, "failed to build discord client");
            return;
        }
    };

    let shard_manager = client.shard_manager.clone();

    tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            info!(%agent_id, "discord bot shutting down");
            shard_manager.shutdown_all().await;
        }
        result = client.start() => {
            if let Err(e) = result {
                warn!(%agent_id, error = %e, "discord client exited unexpectedly");
            }
        }
    }
}
