use crate::bot::transport::{TelegramDelivery, TelegramStatus};
use crate::bot::views::{GENERIC_FAILURE_TEXT, HELP_TEXT, WELCOME_TEXT};
use crate::relay::orchestrator::Orchestrator;
use anyhow::Result;
use std::sync::Arc;
use teloxide::{
    prelude::*,
    types::{ParseMode, ReplyParameters},
    utils::command::BotCommands,
};
use tokio::sync::Semaphore;
use tracing::{error, info};

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Supported commands for the bot
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Show the welcome message
    #[command(description = "Start the bot.")]
    Start,
    /// Show supported links
    #[command(description = "Show supported links.")]
    Help,
}

/// Start handler
///
/// # Errors
///
/// Returns an error if the welcome message cannot be sent.
pub async fn start(bot: Bot, msg: Message) -> Result<()> {
    info!("User {} initiated /start command.", get_user_id_safe(&msg));
    bot.send_message(msg.chat.id, WELCOME_TEXT)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// Help handler
///
/// # Errors
///
/// Returns an error if the help message cannot be sent.
pub async fn help(bot: Bot, msg: Message) -> Result<()> {
    bot.send_message(msg.chat.id, HELP_TEXT)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// Relay the links in a text message.
///
/// Waits for a free slot in `limiter` before doing any work. Internal faults
/// are logged and answered with a generic failure message.
///
/// # Errors
///
/// Returns an error if the generic failure message cannot be sent.
pub async fn handle_text(
    bot: Bot,
    msg: Message,
    orchestrator: Arc<Orchestrator>,
    limiter: Arc<Semaphore>,
) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let user_id = get_user_id_safe(&msg);

    let _permit = limiter.acquire().await?;
    info!("Processing message from user {user_id}");

    let delivery = TelegramDelivery::new(bot.clone(), msg.chat.id, msg.id);
    let status = TelegramStatus::new(bot.clone(), msg.chat.id, msg.id);

    match orchestrator.handle(text, &delivery, &status).await {
        Ok(request) => {
            if let Some(reason) = request.failure() {
                info!(user_id, reason = %reason, "Request failed");
            }
        }
        Err(e) => {
            error!(user_id, error = %e, "Request aborted by internal fault");
            bot.send_message(msg.chat.id, GENERIC_FAILURE_TEXT)
                .parse_mode(ParseMode::Html)
                .reply_parameters(ReplyParameters::new(msg.id))
                .await?;
        }
    }
    Ok(())
}
