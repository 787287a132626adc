use crate::bot::state::State;
use crate::bot::views::{error_text, unknown_kind_text, welcome_text};
use crate::config::{BotSettings, MAX_DOCUMENT_SIZE};
use albumdoc_core::aggregator::{AlbumAggregator, InboundEvent};
use albumdoc_core::error::ConversionError;
use albumdoc_core::intake::PhotoIntake;
use albumdoc_core::output::OutputKind;
use albumdoc_core::transport::MediaRef;
use albumdoc_core::trigger::{ConversionTarget, ConversionTrigger};
use albumdoc_core::utils::truncate_str;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use teloxide::{
    dispatching::dialogue::InMemStorage,
    prelude::*,
    types::{ChatAction, KeyboardRemove, ParseMode},
    utils::command::BotCommands,
};
use tracing::{info, warn};

// Helper function to get user name from Message
fn get_user_name(msg: &Message) -> String {
    if let Some(ref user) = msg.from {
        if let Some(ref username) = user.username {
            return username.clone();
        }
        // first_name is String, not Option<String>
        if !user.first_name.is_empty() {
            return user.first_name.clone();
        }
    }
    "Unknown".to_string()
}

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Supported commands for the bot
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Start the bot and show welcome message
    #[command(description = "Start the bot.")]
    Start,
    /// Show the command list
    #[command(description = "Show this help.")]
    Help,
    /// Convert staged photos, optionally into a given format
    #[command(description = "Make a document from your photos (optionally: pdf or docx).")]
    Convert(String),
    /// Discard staged photos
    #[command(description = "Discard your photos and start over.")]
    Cancel,
    /// Choose the output file name
    #[command(description = "Choose the file name of your next document.")]
    Name(String),
    /// Choose the default output format
    #[command(description = "Choose the default format (pdf or docx).")]
    Format(String),
}

/// Parse an optional output kind argument.
///
/// An empty argument means "not specified". Kinds that exist but are not
/// enabled are rejected like unknown ones.
///
/// # Errors
///
/// Returns the trimmed argument if it does not name an enabled kind.
pub fn parse_kind_arg(arg: &str, enabled: &[OutputKind]) -> Result<Option<OutputKind>, String> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Ok(None);
    }
    match arg.parse::<OutputKind>() {
        Ok(kind) if enabled.contains(&kind) => Ok(Some(kind)),
        _ => Err(arg.to_string()),
    }
}

/// Start handler
///
/// # Errors
///
/// Returns an error if the welcome message cannot be sent.
pub async fn start(
    bot: Bot,
    msg: Message,
    settings: Arc<BotSettings>,
    dialogue: Dialogue<State, InMemStorage<State>>,
) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    let user_name = get_user_name(&msg);

    info!("User {user_id} ({user_name}) initiated /start command.");

    dialogue
        .update(State::Start)
        .await
        .map_err(|e| anyhow!(e.to_string()))?;

    bot.send_message(
        msg.chat.id,
        welcome_text(&settings.core.supported_output_kinds()),
    )
    .parse_mode(ParseMode::Html)
    .await?;

    Ok(())
}

/// Help handler
///
/// # Errors
///
/// Returns an error if the command list cannot be sent.
pub async fn help(bot: Bot, msg: Message) -> Result<()> {
    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await?;
    Ok(())
}

/// Convert handler
///
/// # Errors
///
/// Returns an error if a reply cannot be sent. Conversion failures are
/// reported to the user, not returned.
pub async fn convert(
    bot: Bot,
    msg: Message,
    arg: String,
    trigger: Arc<ConversionTrigger>,
    settings: Arc<BotSettings>,
) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    let kinds = settings.core.supported_output_kinds();

    let kind = match parse_kind_arg(&arg, &kinds) {
        Ok(kind) => kind,
        Err(bad) => {
            bot.send_message(msg.chat.id, unknown_kind_text(&bad, &kinds))
                .parse_mode(ParseMode::Html)
                .await?;
            return Ok(());
        }
    };

    info!("User {user_id} requested conversion (kind: {kind:?}).");
    if !trigger.is_busy(user_id) {
        // Cosmetic only
        let _ = bot
            .send_chat_action(msg.chat.id, ChatAction::UploadDocument)
            .await;
    }

    let target = ConversionTarget {
        user_id,
        chat_id: msg.chat.id.0,
        kind,
        fallback_name: msg.from.as_ref().map(teloxide::types::User::full_name),
    };

    match trigger.convert(target).await {
        Ok(report) => {
            info!(
                "Delivered {} ({} pages) to user {user_id}.",
                report.file_name, report.pages
            );
        }
        Err(e) => {
            if e.is_terminal() {
                warn!("Conversion for user {user_id} failed: {e}");
            }
            bot.send_message(msg.chat.id, error_text(&e))
                .parse_mode(ParseMode::Html)
                .reply_markup(KeyboardRemove::new())
                .await?;
        }
    }
    Ok(())
}

/// Cancel handler
///
/// # Errors
///
/// Returns an error if dialogue update or the reply fails.
pub async fn cancel(
    bot: Bot,
    msg: Message,
    trigger: Arc<ConversionTrigger>,
    dialogue: Dialogue<State, InMemStorage<State>>,
) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    dialogue
        .update(State::Start)
        .await
        .map_err(|e| anyhow!(e.to_string()))?;

    let text = match trigger.cancel(user_id).await {
        Ok(0) => "Nothing to cancel. Send me photos whenever you are ready.".to_string(),
        Ok(discarded) => {
            info!("User {user_id} discarded {discarded} staged file(s).");
            format!("Discarded {discarded} photo(s). Send new ones whenever you are ready.")
        }
        Err(e) => error_text(&e),
    };

    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(KeyboardRemove::new())
        .await?;
    Ok(())
}

/// Name handler: sets the name directly, or asks for it when no argument is given
///
/// # Errors
///
/// Returns an error if dialogue update or the reply fails.
pub async fn name(
    bot: Bot,
    msg: Message,
    arg: String,
    trigger: Arc<ConversionTrigger>,
    dialogue: Dialogue<State, InMemStorage<State>>,
) -> Result<()> {
    if arg.trim().is_empty() {
        dialogue
            .update(State::AwaitingName)
            .await
            .map_err(|e| anyhow!(e.to_string()))?;
        bot.send_message(msg.chat.id, "Send me the file name for your next document.")
            .await?;
        return Ok(());
    }
    save_name(&bot, &msg, &arg, &trigger).await
}

/// Text received while in [`State::AwaitingName`]
///
/// # Errors
///
/// Returns an error if dialogue update or the reply fails.
pub async fn handle_awaiting_name(
    bot: Bot,
    msg: Message,
    trigger: Arc<ConversionTrigger>,
    dialogue: Dialogue<State, InMemStorage<State>>,
) -> Result<()> {
    let text = msg.text().unwrap_or_default().trim().to_string();
    if text.is_empty() || text.starts_with('/') {
        bot.send_message(msg.chat.id, "Please send the file name as plain text.")
            .await?;
        return Ok(());
    }

    dialogue
        .update(State::Start)
        .await
        .map_err(|e| anyhow!(e.to_string()))?;
    save_name(&bot, &msg, &text, &trigger).await
}

async fn save_name(
    bot: &Bot,
    msg: &Message,
    name: &str,
    trigger: &ConversionTrigger,
) -> Result<()> {
    let user_id = get_user_id_safe(msg);
    let name = name.trim();
    info!("User {user_id} set output name to '{}'.", truncate_str(name, 64));
    trigger.set_output_name(user_id, Some(name.to_string()));

    bot.send_message(
        msg.chat.id,
        format!(
            "Your next document will be called <b>{}</b>.",
            html_escape::encode_text(name)
        ),
    )
    .parse_mode(ParseMode::Html)
    .await?;
    Ok(())
}

/// Format handler
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn format(
    bot: Bot,
    msg: Message,
    arg: String,
    trigger: Arc<ConversionTrigger>,
    settings: Arc<BotSettings>,
) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    let kinds = settings.core.supported_output_kinds();

    let text = match parse_kind_arg(&arg, &kinds) {
        Ok(Some(kind)) => match trigger.set_output_kind(user_id, kind) {
            Ok(()) => {
                info!("User {user_id} set output format to {kind}.");
                format!(
                    "Your documents will be made as <b>{}</b>.",
                    kind.to_string().to_uppercase()
                )
            }
            Err(e) => error_text(&e),
        },
        Ok(None) => unknown_kind_text("", &kinds),
        Err(bad) => unknown_kind_text(&bad, &kinds),
    };

    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// Turn a photo or document message into a media reference.
///
/// Photos use the largest available size.
///
/// # Errors
///
/// Returns a user-facing rejection for oversized or non-image documents.
fn extract_media(msg: &Message, intake: &PhotoIntake) -> Result<MediaRef, ConversionError> {
    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        let mut media = MediaRef::photo(photo.file.id.0.clone());
        media.size = Some(u64::from(photo.file.size));
        return Ok(media);
    }

    let document = msg.document().ok_or_else(|| {
        ConversionError::UnsupportedInput("only photos can be converted".to_string())
    })?;
    let size = u64::from(document.file.size);
    if size > MAX_DOCUMENT_SIZE {
        return Err(ConversionError::UnsupportedInput(format!(
            "this file is too large ({} MB max)",
            MAX_DOCUMENT_SIZE / (1024 * 1024)
        )));
    }

    let mut media = MediaRef::document(document.file.id.0.clone(), document.file_name.clone());
    media.size = Some(size);
    intake.check(&media)?;
    Ok(media)
}

/// Photo and document handler: validates and submits to the album aggregator
///
/// # Errors
///
/// Returns an error if the rejection reply fails or staging a single photo fails.
pub async fn handle_media(
    bot: Bot,
    msg: Message,
    aggregator: Arc<AlbumAggregator<MediaRef>>,
    intake: Arc<PhotoIntake>,
) -> Result<()> {
    let user_id = get_user_id_safe(&msg);

    let media = match extract_media(&msg, &intake) {
        Ok(media) => media,
        Err(e) => {
            info!("Rejected media from user {user_id}: {e}");
            bot.send_message(msg.chat.id, error_text(&e))
                .parse_mode(ParseMode::Html)
                .await?;
            return Ok(());
        }
    };

    let event = match msg.media_group_id() {
        Some(group_id) => {
            InboundEvent::grouped(user_id, msg.chat.id.0, group_id.to_string(), media)
        }
        None => InboundEvent::single(user_id, msg.chat.id.0, media),
    };
    aggregator.submit(event).await?;
    Ok(())
}

/// Any other message
///
/// # Errors
///
/// Returns an error if the hint cannot be sent.
pub async fn handle_other(bot: Bot, msg: Message) -> Result<()> {
    bot.send_message(
        msg.chat.id,
        "Send me photos, then /convert to get them as one document. See /help.",
    )
    .await?;
    Ok(())
}
