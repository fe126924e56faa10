use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    Result,
};

/// Outbound side of the messenger.
///
/// The Telegram adapter implements this; the shape leaves room for other
/// messengers without touching the relay.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Send plain text, optionally as a reply to an earlier message.
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageRef>,
    ) -> Result<MessageRef>;

    async fn leave_chat(&self, chat_id: ChatId) -> Result<()>;
}
