use crate::bot::views::DELIVERY_CAPTION;
use albumdoc_core::transport::{DocumentSink, MediaSource};
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatId, FileId, InputFile, KeyboardRemove};
use tracing::debug;

/// Telegram implementation of the core's media and delivery ports.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    /// Create a transport backed by `bot`.
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MediaSource for TelegramTransport {
    async fn download(&self, file_ref: &str, destination: &Path) -> Result<()> {
        // Download file with retry logic
        let buffer = albumdoc_core::utils::retry_transport_operation(|| async {
            let file = self.bot.get_file(FileId(file_ref.to_string())).await?;
            let mut buf = Vec::new();
            self.bot.download_file(&file.path, &mut buf).await?;
            Ok(buf)
        })
        .await?;

        tokio::fs::write(destination, &buffer).await?;
        debug!(file_ref, bytes = buffer.len(), path = %destination.display(), "Media downloaded");
        Ok(())
    }
}

#[async_trait]
impl DocumentSink for TelegramTransport {
    async fn deliver(&self, chat_id: i64, document: &Path, file_name: &str) -> Result<()> {
        let input_file = InputFile::file(document.to_path_buf()).file_name(file_name.to_string());
        self.bot
            .send_document(ChatId(chat_id), input_file)
            .caption(DELIVERY_CAPTION)
            .reply_markup(KeyboardRemove::new())
            .await?;
        Ok(())
    }
}
