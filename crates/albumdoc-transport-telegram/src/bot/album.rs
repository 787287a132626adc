use crate::bot::resilient::send_message_resilient;
use crate::bot::views::{error_text, staged_text, staging_keyboard};
use crate::config::BotSettings;
use albumdoc_core::aggregator::{Batch, BatchHandler};
use albumdoc_core::error::ConversionError;
use albumdoc_core::intake::PhotoIntake;
use albumdoc_core::transport::MediaRef;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ChatId, ParseMode, ReplyMarkup};
use tracing::warn;

/// Stages aggregated batches and acknowledges them in the chat.
pub struct TelegramBatchHandler {
    bot: Bot,
    intake: Arc<PhotoIntake>,
    settings: Arc<BotSettings>,
}

impl TelegramBatchHandler {
    /// Create a handler that stages through `intake`.
    pub const fn new(bot: Bot, intake: Arc<PhotoIntake>, settings: Arc<BotSettings>) -> Self {
        Self {
            bot,
            intake,
            settings,
        }
    }
}

#[async_trait]
impl BatchHandler<MediaRef> for TelegramBatchHandler {
    async fn handle(&self, batch: Batch<MediaRef>) -> Result<()> {
        let chat_id = ChatId(batch.chat_id);
        match self.intake.stage_batch(&batch).await {
            Ok(report) => {
                let keyboard = staging_keyboard(&self.settings.core.supported_output_kinds());
                send_message_resilient(
                    &self.bot,
                    chat_id,
                    staged_text(report),
                    None,
                    Some(ReplyMarkup::Keyboard(keyboard)),
                )
                .await?;
                Ok(())
            }
            Err(e @ ConversionError::UnsupportedInput(_)) => {
                warn!(user_id = batch.sender_id, "Batch rejected: {e}");
                let text = error_text(&e);
                send_message_resilient(&self.bot, chat_id, text, Some(ParseMode::Html), None)
                    .await?;
                Ok(())
            }
            Err(e) => {
                // Best effort: the staging error is what gets reported upstream
                let text = error_text(&e);
                if let Err(notify) =
                    send_message_resilient(&self.bot, chat_id, text, Some(ParseMode::Html), None)
                        .await
                {
                    warn!(user_id = batch.sender_id, "Failed to report staging error: {notify:#}");
                }
                Err(e.into())
            }
        }
    }
}
