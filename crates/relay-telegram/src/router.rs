use std::sync::Arc;

use secrecy::ExposeSecret;
use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::BotCommand};

use relay_core::{
    config::Config,
    messaging::port::MessagingPort,
    relay::{Relay, COMMANDS},
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub relay: Arc<Relay>,
    pub messenger: Arc<dyn MessagingPort>,
    /// Without the leading `@`.
    pub bot_username: String,
    pub bot_id: teloxide::types::UserId,
}

impl AppState {
    pub fn bot_mention(&self) -> String {
        format!("@{}", self.bot_username)
    }
}

pub async fn run_polling(cfg: Arc<Config>, relay: Arc<Relay>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.expose_secret());

    let me = bot.get_me().await?;
    tracing::info!(username = %me.username(), "relay bot started");
    tracing::info!(
        model = %cfg.model,
        allowed_users = cfg.allowed_users.len(),
        allowed_groups = cfg.allowed_groups.len(),
        max_messages_per_hour = cfg.max_messages_per_hour,
        cooldown_secs = cfg.cooldown.as_secs(),
        "configuration loaded"
    );

    // Start from a clean slate: messages sent while we were down are not answered.
    if let Err(e) = bot.delete_webhook().drop_pending_updates(true).await {
        tracing::warn!(error = %e, "failed to drop pending updates");
    }

    let commands: Vec<BotCommand> = COMMANDS
        .iter()
        .map(|(name, description)| BotCommand::new(*name, *description))
        .collect();
    if let Err(e) = bot.set_my_commands(commands).await {
        tracing::warn!(error = %e, "failed to register bot commands");
    }

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));

    let state = Arc::new(AppState {
        cfg,
        relay,
        messenger,
        bot_username: me.username().to_string(),
        bot_id: me.user.id,
    });

    let handler =
        dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
