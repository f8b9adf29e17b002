//! Telegram-backed delivery and status channels for one incoming message.

use crate::bot::progress_render::render_status_html;
use crate::bot::resilient::{
    delete_message_resilient, edit_message_safe_resilient, send_message_resilient,
};
use crate::relay::error::SendError;
use crate::relay::status::{StatusChannel, StatusUpdate};
use crate::relay::transfer::{Attachment, AttachmentKind, DeliveryChannel};
use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, MessageId, ParseMode, ReplyParameters};
use teloxide::RequestError;
use tokio::sync::Mutex;
use tracing::warn;

/// Classify a Bot API failure for the upload retry policy.
#[must_use]
pub fn classify_request_error(error: &RequestError) -> SendError {
    match error {
        RequestError::RetryAfter(wait) => SendError::RateLimited(wait.duration()),
        RequestError::Network(_) | RequestError::Io(_) => SendError::Transient(error.to_string()),
        _ => SendError::Fatal(error.to_string()),
    }
}

/// Sends attachments as replies to the user's message
pub struct TelegramDelivery {
    bot: Bot,
    chat_id: ChatId,
    reply_to: MessageId,
}

impl TelegramDelivery {
    /// Delivery channel replying to `reply_to` in `chat_id`
    pub const fn new(bot: Bot, chat_id: ChatId, reply_to: MessageId) -> Self {
        Self {
            bot,
            chat_id,
            reply_to,
        }
    }

    async fn send_document(&self, attachment: &Attachment) -> Result<(), RequestError> {
        self.bot
            .send_document(self.chat_id, InputFile::file(&attachment.path))
            .caption(attachment.caption.clone())
            .reply_parameters(ReplyParameters::new(self.reply_to))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl DeliveryChannel for TelegramDelivery {
    async fn send(&self, attachment: &Attachment) -> Result<(), SendError> {
        let result = match attachment.kind {
            AttachmentKind::Video => {
                let sent = self
                    .bot
                    .send_video(self.chat_id, InputFile::file(&attachment.path))
                    .caption(attachment.caption.clone())
                    .supports_streaming(true)
                    .reply_parameters(ReplyParameters::new(self.reply_to))
                    .await
                    .map(|_| ());
                match sent {
                    Err(e) if matches!(classify_request_error(&e), SendError::Fatal(_)) => {
                        warn!(
                            path = %attachment.path.display(),
                            error = %e,
                            "Failed to send video as native media; falling back to document"
                        );
                        self.send_document(attachment).await
                    }
                    other => other,
                }
            }
            AttachmentKind::Photo => self
                .bot
                .send_photo(self.chat_id, InputFile::file(&attachment.path))
                .caption(attachment.caption.clone())
                .reply_parameters(ReplyParameters::new(self.reply_to))
                .await
                .map(|_| ()),
            AttachmentKind::Document => self.send_document(attachment).await,
        };

        result.map_err(|e| classify_request_error(&e))
    }
}

/// A single status message, created on first update, edited in place and
/// deleted on success
pub struct TelegramStatus {
    bot: Bot,
    chat_id: ChatId,
    reply_to: MessageId,
    message: Mutex<Option<MessageId>>,
}

impl TelegramStatus {
    /// Status for the request triggered by `reply_to`
    pub fn new(bot: Bot, chat_id: ChatId, reply_to: MessageId) -> Self {
        Self {
            bot,
            chat_id,
            reply_to,
            message: Mutex::new(None),
        }
    }
}

#[async_trait]
impl StatusChannel for TelegramStatus {
    async fn update(&self, update: &StatusUpdate) -> Result<()> {
        let text = render_status_html(update);
        let mut message = self.message.lock().await;

        if let Some(id) = *message {
            // Resilient helper handles retries and logging internally
            let _ = edit_message_safe_resilient(&self.bot, self.chat_id, id, &text).await;
            return Ok(());
        }

        let sent = send_message_resilient(
            &self.bot,
            self.chat_id,
            text,
            Some(ParseMode::Html),
            Some(self.reply_to),
        )
        .await?;
        *message = Some(sent.id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let Some(id) = self.message.lock().await.take() else {
            return Ok(());
        };
        delete_message_resilient(&self.bot, self.chat_id, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use teloxide::types::Seconds;
    use teloxide::ApiError;

    #[test]
    fn test_retry_after_is_rate_limit() {
        let error = RequestError::RetryAfter(Seconds::from_seconds(7));
        assert_eq!(
            classify_request_error(&error),
            SendError::RateLimited(Duration::from_secs(7))
        );
    }

    #[test]
    fn test_api_rejection_is_fatal() {
        let error = RequestError::Api(ApiError::BotBlocked);
        assert!(matches!(classify_request_error(&error), SendError::Fatal(_)));
    }
}
