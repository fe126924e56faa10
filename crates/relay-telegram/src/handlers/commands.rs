use std::sync::Arc;

use teloxide::prelude::*;

use relay_core::{
    domain::{ChatId, UserId},
    messaging::types::Command,
};

use crate::router::AppState;

use super::send;

pub async fn handle_command(msg: &Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let user_id = msg.from().map(|u| u.id.0 as i64).unwrap_or_default();

    let Some(cmd) = Command::parse(ChatId(msg.chat.id.0), UserId(user_id), text) else {
        return Ok(());
    };
    if !cmd.is_for(&state.bot_username) {
        return Ok(());
    }

    if let Some(reply) = state.relay.on_command(&cmd) {
        send(&state, msg, &reply, false).await;
    }
    Ok(())
}
