use std::sync::Arc;

use teloxide::prelude::*;

use relay_core::{
    domain::{ChatId, UserId},
    messaging::types::{Reply, TextMessage},
    relay::COMPLETION_FAILED_TEXT,
};

use crate::router::AppState;

use super::send;

/// Lift a Telegram text message into the relay's view of it.
fn to_text_message(msg: &Message, bot_mention: String) -> Option<TextMessage> {
    let user = msg.from()?;
    let text = msg.text()?;
    Some(TextMessage {
        user_id: UserId(user.id.0 as i64),
        username: user.username.clone(),
        chat_id: ChatId(msg.chat.id.0),
        chat_is_private: msg.chat.is_private(),
        text: text.to_string(),
        bot_mention,
    })
}

pub async fn handle_text(msg: &Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(incoming) = to_text_message(msg, state.bot_mention()) else {
        return Ok(());
    };

    // Dropping the relay future abandons the completion call; rate state was
    // already recorded before it started.
    let reply = match tokio::time::timeout(
        state.cfg.handler_timeout,
        state.relay.on_message(&incoming),
    )
    .await
    {
        Ok(reply) => reply,
        Err(_) => {
            tracing::error!(
                user_id = incoming.user_id.0,
                timeout = ?state.cfg.handler_timeout,
                "message handling timed out"
            );
            Reply::text(COMPLETION_FAILED_TEXT)
        }
    };

    if let Reply::Text(reply) = reply {
        send(&state, msg, &reply, true).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn message(chat: serde_json::Value, text: &str) -> Message {
        serde_json::from_value(json!({
            "message_id": 10,
            "date": 1_760_000_000,
            "chat": chat,
            "from": {"id": 42, "is_bot": false, "first_name": "Alice", "username": "alice"},
            "text": text
        }))
        .unwrap()
    }

    #[test]
    fn private_message_is_lifted() {
        let msg = message(
            json!({"id": 42, "type": "private", "first_name": "Alice"}),
            "hello",
        );
        let m = to_text_message(&msg, "@relay_bot".to_string()).unwrap();

        assert_eq!(m.user_id, UserId(42));
        assert_eq!(m.username.as_deref(), Some("alice"));
        assert_eq!(m.chat_id, ChatId(42));
        assert!(m.chat_is_private);
        assert_eq!(m.text, "hello");
        assert_eq!(m.bot_mention, "@relay_bot");
    }

    #[test]
    fn group_message_is_not_private() {
        let msg = message(
            json!({"id": -100123, "type": "group", "title": "Rustaceans"}),
            "@relay_bot hi",
        );
        let m = to_text_message(&msg, "@relay_bot".to_string()).unwrap();

        assert_eq!(m.chat_id, ChatId(-100123));
        assert!(!m.chat_is_private);
    }
}
