//! Outbound reply delivery.
//!
//! Maps a pipeline outcome to exactly one user-facing message and sends it
//! to the originating chat. Delivery is best effort: a failed send is
//! logged and counted, never retried and never propagated.

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::error;

use crate::llm::CompletionError;
use crate::metrics::{ErrorCategory, Metrics};
use crate::utils;

/// Telegram's hard limit on message length, in characters.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Fixed fallback replies, keyed by failure category. None of them leak
/// internal error detail.
pub const REPLY_RATE_LIMITED: &str =
    "Вибачте, зараз занадто багато запитів. Будь ласка, спробуйте трохи пізніше.";
pub const REPLY_UNAVAILABLE: &str =
    "Вибачте, сервіс тимчасово недоступний. Будь ласка, спробуйте пізніше.";
pub const REPLY_INVALID_REQUEST: &str =
    "Вибачте, виникла помилка при обробці вашого запиту. Будь ласка, спробуйте пізніше.";
pub const REPLY_UNKNOWN: &str =
    "Вибачте, виникла невідома помилка. Спробуйте ще раз пізніше.";
pub const REPLY_VALIDATION: &str =
    "Вибачте, я можу обробити лише непорожнє текстове повідомлення до 4096 символів.";

/// Message-sending seam so the pipeline can be tested without Telegram.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Responder: Send + Sync {
    /// Send a plain-text message to a chat
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()>;
}

/// Production responder backed by the Telegram Bot API.
pub struct TelegramResponder {
    bot: Bot,
}

impl TelegramResponder {
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait::async_trait]
impl Responder for TelegramResponder {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.bot.send_message(chat_id, text).await?;
        Ok(())
    }
}

/// The fixed user-facing reply for a failed completion.
#[must_use]
pub fn reply_for_error(error: &CompletionError) -> &'static str {
    match error.category() {
        ErrorCategory::RateLimited => REPLY_RATE_LIMITED,
        ErrorCategory::Network | ErrorCategory::Api => REPLY_UNAVAILABLE,
        ErrorCategory::InvalidRequest => REPLY_INVALID_REQUEST,
        ErrorCategory::Unknown => REPLY_UNKNOWN,
    }
}

/// The user-facing reply for a successful completion, trimmed to fit one
/// Telegram message.
#[must_use]
pub fn reply_for_success(text: &str) -> String {
    utils::truncate_str(text, TELEGRAM_MESSAGE_LIMIT)
}

/// Deliver one reply to the chat, best effort.
pub async fn deliver(responder: &dyn Responder, metrics: &Metrics, chat_id: ChatId, text: &str) {
    if let Err(e) = responder.send_text(chat_id, text).await {
        metrics.record_send_failure();
        error!(chat_id = chat_id.0, error = %e, "failed to send reply");
    }
}
