//! The relay: decides whether an inbound message gets forwarded to the model
//! and what, if anything, goes back to the chat.
//!
//! Order of evaluation for a text message:
//! 1. group chats need an explicit `@mention`; it is stripped from the question
//! 2. user allow-list, then group allow-list (silence on failure)
//! 3. admission (cooldown + hourly quota), recorded before the network call
//! 4. completion, then truncation to the configured reply length
//!
//! Failures are turned into fixed user-facing strings here. Upstream error
//! bodies and other internals only reach the logs.

use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::{
    admission::{Admission, AdmissionController, AdmissionLimits, RateStore},
    config::Config,
    domain::ChatId,
    errors::Error,
    messaging::types::{Command, Reply, TextMessage},
    model::{
        client::{CompletionBackend, CompletionClient, RetryPolicy},
        types::{ApiError, CompletionSettings},
    },
    security::{is_group_allowed, is_user_allowed},
    Result,
};

pub const TRUNCATION_MARKER: &str = "...(response truncated)";

pub const EMPTY_QUESTION_TEXT: &str = "❓ Please ask a question";
pub const RATE_LIMITED_TEXT: &str =
    "⚠️ You're sending messages too frequently. Please wait a moment.";
pub const COMPLETION_FAILED_TEXT: &str =
    "❌ Sorry, an error occurred while processing your request. Please try again later.";
pub const INTERNAL_ERROR_TEXT: &str = "❌ An internal error occurred. Please try again later.";
pub const GROUP_NOT_ALLOWED_TEXT: &str =
    "⚠️ This bot can only be used in authorized groups. Leaving the chat...";

const LOG_PREVIEW_CHARS: usize = 100;

const START_TEXT: &str = "👋 Hello! I'm an AI assistant powered by Claude.\n\n\
📝 How to use:\n\
1. In private chat, just send me your questions directly\n\
2. In groups, mention me (@bot) with your question\n\
3. Use /help to see all available commands\n\
4. Use /status to check system status\n\n\
⚠️ Note: Message rate limiting is enabled to prevent abuse";

const HELP_TEXT: &str = "🤖 Bot Commands:\n\n\
/start - Start the bot and see welcome message\n\
/help - Display this help message\n\
/status - Check system status\n\
/reset - Reset your conversation\n\n\
💡 Tips:\n\
- In private chat, just send your questions directly\n\
- In groups, mention me with @bot_username";

const RESET_TEXT: &str = "✨ Your conversation history has been reset";

/// Commands registered with the messenger, with their menu descriptions.
pub const COMMANDS: [(&str, &str); 4] = [
    ("start", "Start the bot"),
    ("help", "Show help message"),
    ("status", "Check bot status"),
    ("reset", "Reset conversation"),
];

pub struct Relay {
    cfg: Arc<Config>,
    admission: AdmissionController,
    completion: CompletionClient,
}

impl Relay {
    pub fn new(
        cfg: Arc<Config>,
        admission: AdmissionController,
        completion: CompletionClient,
    ) -> Self {
        Self {
            cfg,
            admission,
            completion,
        }
    }

    /// Wire a relay from configuration around the given completion backend.
    pub fn from_config(cfg: Arc<Config>, backend: Arc<dyn CompletionBackend>) -> Self {
        let admission = AdmissionController::new(
            Arc::new(RateStore::new()),
            AdmissionLimits::new(cfg.cooldown, cfg.max_messages_per_hour),
        );
        let completion = CompletionClient::new(
            backend,
            CompletionSettings {
                model: cfg.model.clone(),
                max_tokens: cfg.max_tokens,
                temperature: cfg.temperature,
            },
            RetryPolicy::default().with_max_attempts(cfg.retry_max_attempts),
        );
        Self::new(cfg, admission, completion)
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Reply text for a fixed command, `None` for commands we don't know.
    pub fn on_command(&self, cmd: &Command) -> Option<String> {
        self.on_command_at(cmd, Local::now())
    }

    pub fn on_command_at(&self, cmd: &Command, now: DateTime<Local>) -> Option<String> {
        let reply = match cmd.name.as_str() {
            "start" => START_TEXT.to_string(),
            "help" => HELP_TEXT.to_string(),
            "status" => self.status_text(now),
            // No conversation memory exists, so there is nothing to clear.
            "reset" => RESET_TEXT.to_string(),
            _ => return None,
        };
        tracing::debug!(
            command = %cmd.name,
            user_id = cmd.user_id.0,
            chat_id = cmd.chat_id.0,
            "command handled"
        );
        Some(reply)
    }

    fn status_text(&self, now: DateTime<Local>) -> String {
        format!(
            "🔄 System Status:\n\n\
✅ Bot is running normally\n\
📊 Current model: {}\n\
⏰ Server time: {}\n",
            self.cfg.model,
            now.format("%Y-%m-%d %H:%M:%S")
        )
    }

    /// Handle an inbound text message.
    pub async fn on_message(&self, msg: &TextMessage) -> Reply {
        match self.process(msg).await {
            Ok(reply) => reply,
            Err(Error::AuthorizationDenied(reason)) => {
                tracing::warn!(
                    user_id = msg.user_id.0,
                    username = msg.username.as_deref().unwrap_or("unknown"),
                    chat_id = msg.chat_id.0,
                    %reason,
                    "unauthorized access attempt"
                );
                Reply::Silence
            }
            Err(Error::RateLimited(reason)) => {
                tracing::info!(user_id = msg.user_id.0, %reason, "message rate limited");
                Reply::text(RATE_LIMITED_TEXT)
            }
            Err(Error::Api(e)) => {
                tracing::error!(
                    user_id = msg.user_id.0,
                    kind = %e.kind,
                    status = ?e.status,
                    error = %e.message,
                    "completion failed"
                );
                Reply::text(COMPLETION_FAILED_TEXT)
            }
            Err(e) => {
                tracing::error!(
                    user_id = msg.user_id.0,
                    error = ?e,
                    "unexpected error handling message"
                );
                Reply::text(INTERNAL_ERROR_TEXT)
            }
        }
    }

    async fn process(&self, msg: &TextMessage) -> Result<Reply> {
        // Group chatter that doesn't address the bot is not an access attempt.
        let Some(question) = extract_question(msg) else {
            return Ok(Reply::Silence);
        };

        if !is_user_allowed(msg.user_id, &self.cfg.allowed_users) {
            return Err(Error::AuthorizationDenied(
                "user not in allow-list".to_string(),
            ));
        }
        if !msg.chat_is_private && !is_group_allowed(msg.chat_id, &self.cfg.allowed_groups) {
            return Err(Error::AuthorizationDenied(
                "group not in allow-list".to_string(),
            ));
        }

        if question.is_empty() {
            return Ok(Reply::text(EMPTY_QUESTION_TEXT));
        }

        // Recorded before the network call: a cancelled or timed-out request
        // still counts against the user.
        if let Admission::Denied(reason) = self.admission.admit(msg.user_id).await {
            return Err(Error::RateLimited(reason));
        }

        tracing::info!(
            user_id = msg.user_id.0,
            username = msg.username.as_deref().unwrap_or("unknown"),
            question = %preview(&question),
            "received request"
        );

        let answer = self
            .completion
            .complete(&question, Some(&self.cfg.system_prompt))
            .await?;
        if answer.trim().is_empty() {
            return Err(ApiError::permanent("completion returned no text").into());
        }
        let reply = truncate_reply(&answer, self.cfg.max_response_length);

        tracing::info!(
            user_id = msg.user_id.0,
            length = reply.chars().count(),
            "sending response"
        );
        Ok(Reply::Text(reply))
    }

    /// Leave signal for a group the bot was just added to.
    ///
    /// Only a configured (non-empty) group allow-list can trigger a leave.
    pub fn on_bot_added_to_group(&self, group_id: ChatId) -> bool {
        let leave = !is_group_allowed(group_id, &self.cfg.allowed_groups);
        if leave {
            tracing::warn!(chat_id = group_id.0, "bot added to unauthorized group");
        }
        leave
    }
}

/// The question to forward, or `None` when a group message doesn't address us.
pub fn extract_question(msg: &TextMessage) -> Option<String> {
    if msg.chat_is_private {
        return Some(msg.text.trim().to_string());
    }

    let mention = msg.bot_mention.trim();
    if mention.is_empty() || !msg.text.contains(mention) {
        return None;
    }
    Some(msg.text.replace(mention, "").trim().to_string())
}

/// Cut `text` so that, marker included, it never exceeds `max_len` chars.
pub fn truncate_reply(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }

    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_len <= marker_len {
        return text.chars().take(max_len).collect();
    }

    let mut out: String = text.chars().take(max_len - marker_len).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

fn preview(s: &str) -> String {
    if s.chars().count() <= LOG_PREVIEW_CHARS {
        return s.to_string();
    }
    format!("{}...", s.chars().take(LOG_PREVIEW_CHARS).collect::<String>())
}
