//! Telegram update handlers.
//!
//! Each handler is a thin adapter: it lifts the teloxide message into core
//! types, asks the relay what to do and sends the answer back.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use relay_core::domain::{ChatId, MessageId, MessageRef};

use crate::router::AppState;

mod commands;
mod membership;
mod text;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if let Some(members) = msg.new_chat_members() {
        return membership::handle_new_members(&msg, members, state).await;
    }

    let Some(body) = msg.text() else {
        return Ok(());
    };

    if body.starts_with('/') {
        return commands::handle_command(&msg, state).await;
    }

    text::handle_text(&msg, state).await
}

fn message_ref(msg: &Message) -> MessageRef {
    MessageRef {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
    }
}

/// Send `text` to the message's chat. Delivery failures are logged, not raised.
async fn send(state: &AppState, msg: &Message, text: &str, as_reply: bool) {
    let origin = message_ref(msg);
    let reply_to = as_reply.then_some(origin);
    if let Err(e) = state
        .messenger
        .send_text(origin.chat_id, text, reply_to)
        .await
    {
        tracing::warn!(chat_id = origin.chat_id.0, error = %e, "failed to send message");
    }
}
