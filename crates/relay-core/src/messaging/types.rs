use crate::domain::{ChatId, UserId};

/// A bot command (`/start`, `/status@my_bot`, ...).
#[derive(Clone, Debug)]
pub struct Command {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub name: String,
    pub args: String,
    /// Bot addressed via `/cmd@botname`, if any.
    pub target: Option<String>,
}

impl Command {
    /// Parse `/cmd@botname arg1 ...`. Returns `None` for non-command text.
    pub fn parse(chat_id: ChatId, user_id: UserId, text: &str) -> Option<Self> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }

        let mut parts = text.splitn(2, char::is_whitespace);
        let first = parts.next().unwrap_or("").trim();
        let args = parts.next().unwrap_or("").trim().to_string();

        let mut head = first.trim_start_matches('/').splitn(2, '@');
        let name = head.next().unwrap_or("").to_lowercase();
        let target = head
            .next()
            .map(str::to_string)
            .filter(|t| !t.is_empty());

        if name.is_empty() {
            return None;
        }

        Some(Self {
            chat_id,
            user_id,
            name,
            args,
            target,
        })
    }

    /// Whether this command is meant for the bot named `bot_username`.
    pub fn is_for(&self, bot_username: &str) -> bool {
        match &self.target {
            None => true,
            Some(t) => t.eq_ignore_ascii_case(bot_username.trim_start_matches('@')),
        }
    }
}

/// An inbound text message, already stripped of Telegram specifics.
#[derive(Clone, Debug)]
pub struct TextMessage {
    pub user_id: UserId,
    pub username: Option<String>,
    pub chat_id: ChatId,
    pub chat_is_private: bool,
    pub text: String,
    /// The bot's own mention, e.g. `@my_bot`.
    pub bot_mention: String,
}

/// What the relay wants sent back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Silence,
}

impl Reply {
    pub fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Reply::Text(s) => Some(s),
            Reply::Silence => None,
        }
    }
}
