//! Inbound update pipeline.
//!
//! Extracts the user's text from a Telegram update, answers the two fixed
//! commands, and relays everything else through the completion client to
//! the outbound responder. Control flow is strictly linear per update.

use teloxide::types::{Message, Update, UpdateKind};
use tracing::{debug, info, warn};

use crate::bot::outbound;
use crate::utils;
use crate::web::AppState;

/// Longest inbound text forwarded to the model, in characters.
const MAX_INPUT_CHARS: usize = 4096;

pub const REPLY_START: &str =
    "Привіт! Я бот, що відповідає через налаштовану GPTS-модель. Напишіть будь-яке повідомлення.";
pub const REPLY_HELP: &str = "Просто надішліть мені повідомлення, і я відповім!\n\n\
    Доступні команди:\n\
    /start - Почати роботу з ботом\n\
    /help - Показати цю довідку";

/// Commands understood by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Help,
}

/// Parse a leading `/command` or `/command@botname` token.
fn parse_command(text: &str) -> Option<Command> {
    let first = text.split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    match name {
        "start" => Some(Command::Start),
        "help" => Some(Command::Help),
        _ => None,
    }
}

/// Process one Telegram update end to end.
///
/// Always completes without an error: every failure mode ends in either a
/// fixed fallback reply or a logged, counted drop.
pub async fn process_update(state: &AppState, update: Update) {
    let message = match &update.kind {
        UpdateKind::Message(message) => message,
        UpdateKind::Error(value) => {
            state.metrics.record_malformed_update();
            warn!(payload = %value, "discarding unrecognized update payload");
            return;
        }
        _ => {
            debug!("ignoring non-message update");
            return;
        }
    };

    if message.from.as_ref().is_some_and(|u| u.is_bot) {
        debug!(chat_id = message.chat.id.0, "ignoring message from another bot");
        return;
    }

    state.metrics.record_request();
    handle_message(state, message).await;
}

async fn handle_message(state: &AppState, message: &Message) {
    let chat_id = message.chat.id;

    let text = message.text().map(str::trim).unwrap_or_default();
    if text.is_empty() || text.chars().count() > MAX_INPUT_CHARS {
        state.metrics.record_empty_message();
        outbound::deliver(
            state.responder.as_ref(),
            &state.metrics,
            chat_id,
            outbound::REPLY_VALIDATION,
        )
        .await;
        return;
    }

    if text.starts_with('/') {
        match parse_command(text) {
            Some(Command::Start) => {
                info!(chat_id = chat_id.0, "start command");
                outbound::deliver(state.responder.as_ref(), &state.metrics, chat_id, REPLY_START)
                    .await;
            }
            Some(Command::Help) => {
                outbound::deliver(state.responder.as_ref(), &state.metrics, chat_id, REPLY_HELP)
                    .await;
            }
            None => {
                debug!(chat_id = chat_id.0, "ignoring unknown command");
            }
        }
        return;
    }

    info!(
        chat_id = chat_id.0,
        preview = %utils::truncate_str(text, 30),
        "forwarding message to model"
    );

    let reply = match state.completions.complete(text).await {
        Ok(response) => outbound::reply_for_success(&response),
        Err(e) => outbound::reply_for_error(&e).to_string(),
    };

    outbound::deliver(state.responder.as_ref(), &state.metrics, chat_id, &reply).await;
}
