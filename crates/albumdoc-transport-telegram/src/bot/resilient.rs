//! Resilient messaging utilities with automatic retry for Telegram API operations.
//!
//! Notices sent from deferred album tasks have no update to answer, so a
//! transient network error would otherwise silently drop them. Document
//! delivery does not go through here: it is single-shot.
//!
//! # Usage
//!
//! ```ignore
//! use albumdoc_transport_telegram::bot::resilient::send_message_resilient;
//!
//! let msg = send_message_resilient(&bot, chat_id, "Got your photo.", None, None).await?;
//! ```

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Message, ParseMode, ReplyMarkup};
use tracing::debug;

/// Send a message with automatic retry on network failures.
///
/// Uses [`albumdoc_core::utils::retry_transport_operation`] with exponential backoff
/// to handle transient network errors.
///
/// # Arguments
///
/// * `bot` - The Telegram bot instance
/// * `chat_id` - Target chat ID
/// * `text` - Message text to send
/// * `parse_mode` - Optional parse mode (HTML, Markdown, etc.)
/// * `markup` - Optional reply markup (keyboard)
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    parse_mode: Option<ParseMode>,
    markup: Option<ReplyMarkup>,
) -> Result<Message> {
    let text = text.into();
    let message = albumdoc_core::utils::retry_transport_operation(|| async {
        let mut req = bot.send_message(chat_id, text.clone());
        if let Some(pm) = parse_mode {
            req = req.parse_mode(pm);
        }
        if let Some(markup) = markup.clone() {
            req = req.reply_markup(markup);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await?;
    debug!(chat_id = chat_id.0, "Notice sent");
    Ok(message)
}
