use std::sync::Arc;

use teloxide::{prelude::*, types::User};

use relay_core::{domain::ChatId, relay::GROUP_NOT_ALLOWED_TEXT};

use crate::router::AppState;

use super::send;

/// The bot was (possibly) added to a group: leave it unless it is allowed.
pub async fn handle_new_members(
    msg: &Message,
    members: &[User],
    state: Arc<AppState>,
) -> ResponseResult<()> {
    if !members.iter().any(|m| m.id == state.bot_id) {
        return Ok(());
    }

    let chat_id = ChatId(msg.chat.id.0);
    if !state.relay.on_bot_added_to_group(chat_id) {
        tracing::info!(chat_id = chat_id.0, title = msg.chat.title().unwrap_or(""), "added to group");
        return Ok(());
    }

    send(&state, msg, GROUP_NOT_ALLOWED_TEXT, false).await;
    if let Err(e) = state.messenger.leave_chat(chat_id).await {
        tracing::error!(chat_id = chat_id.0, error = %e, "failed to leave unauthorized group");
    }
    Ok(())
}
