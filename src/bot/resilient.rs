//! Resilient messaging utilities with automatic retry for Telegram API operations.
//!
//! Wrappers around the status message operations that retry transient network
//! failures using exponential backoff with jitter.
//!
//! # Usage
//!
//! ```ignore
//! use oxide_relay::bot::resilient::{send_message_resilient, edit_message_safe_resilient};
//!
//! let msg = send_message_resilient(&bot, chat_id, "🔄 Processing...", Some(ParseMode::Html)).await?;
//! let success = edit_message_safe_resilient(&bot, chat_id, msg.id, "⏬ Downloading...").await;
//! ```

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Message, MessageId, ParseMode, ReplyParameters};
use tracing::{debug, warn};

/// Status texts longer than this are truncated (Telegram's limit is 4096)
const STATUS_TEXT_LIMIT: usize = 4000;

/// Send a message with automatic retry on network failures.
///
/// When `reply_to` is set, the message is threaded under it.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    parse_mode: Option<ParseMode>,
    reply_to: Option<MessageId>,
) -> Result<Message> {
    let text = text.into();
    crate::utils::retry_telegram_operation(|| async {
        let mut req = bot.send_message(chat_id, text.clone());
        if let Some(pm) = parse_mode {
            req = req.parse_mode(pm);
        }
        if let Some(id) = reply_to {
            req = req.reply_parameters(ReplyParameters::new(id));
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Edit a message with automatic retry on network failures.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn edit_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: impl Into<String>,
    parse_mode: Option<ParseMode>,
) -> Result<Message> {
    let text = text.into();
    crate::utils::retry_telegram_operation(|| async {
        let mut req = bot.edit_message_text(chat_id, msg_id, text.clone());
        if let Some(pm) = parse_mode {
            req = req.parse_mode(pm);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram edit error: {e}"))
    })
    .await
}

fn fit_status_text(text: &str) -> String {
    if text.chars().count() > STATUS_TEXT_LIMIT {
        let truncated_text = crate::utils::truncate_str(text, STATUS_TEXT_LIMIT);
        format!("{truncated_text}...")
    } else {
        text.to_string()
    }
}

/// Edit message with graceful degradation and automatic retry.
///
/// Truncates long text, retries transient errors and treats "message is not
/// modified" / "message to edit not found" as expected.
///
/// Returns `true` if the message was edited.
pub async fn edit_message_safe_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: &str,
) -> bool {
    const ERROR_NOT_MODIFIED: &str = "message is not modified";
    const ERROR_NOT_FOUND: &str = "message to edit not found";

    match edit_message_resilient(bot, chat_id, msg_id, fit_status_text(text), Some(ParseMode::Html))
        .await
    {
        Ok(_) => true,
        Err(e) => {
            let err_msg = e.to_string();
            if err_msg.contains(ERROR_NOT_MODIFIED) || err_msg.contains(ERROR_NOT_FOUND) {
                debug!("Message update skipped: {err_msg}");
            } else {
                warn!("Failed to edit message after retries: {e}");
            }
            false
        }
    }
}

/// Delete a message with automatic retry on network failures.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn delete_message_resilient(bot: &Bot, chat_id: ChatId, msg_id: MessageId) -> Result<()> {
    crate::utils::retry_telegram_operation(|| async {
        bot.delete_message(chat_id, msg_id)
            .await
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("Telegram delete error: {e}"))
    })
    .await
}
