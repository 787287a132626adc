use crate::bot;
use crate::bot::album::TelegramBatchHandler;
use crate::bot::handlers::Command;
use crate::bot::state::State;
use crate::bot::transport::TelegramTransport;
use crate::config::BotSettings;
use albumdoc_core::aggregator::AlbumAggregator;
use albumdoc_core::intake::PhotoIntake;
use albumdoc_core::render::DocumentRenderer;
use albumdoc_core::session::SessionStore;
use albumdoc_core::staging::StagingArea;
use albumdoc_core::transport::MediaRef;
use albumdoc_core::trigger::ConversionTrigger;
use std::sync::Arc;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

/// Run the Telegram transport runtime.
pub async fn run_bot(settings: Arc<BotSettings>) {
    let staging = init_staging(&settings).await;

    let bot = Bot::new(settings.telegram.telegram_token.clone());
    let transport = Arc::new(TelegramTransport::new(bot.clone()));
    let sessions = Arc::new(SessionStore::new());

    let intake = Arc::new(PhotoIntake::from_settings(
        transport.clone(),
        Arc::clone(&sessions),
        &settings.core,
    ));
    let aggregator = Arc::new(AlbumAggregator::new(
        settings.core.quiescence(),
        settings.core.album_timer_policy,
        Arc::new(TelegramBatchHandler::new(
            bot.clone(),
            Arc::clone(&intake),
            Arc::clone(&settings),
        )),
    ));
    let trigger = Arc::new(ConversionTrigger::new(
        sessions,
        staging,
        Arc::new(DocumentRenderer::new()),
        transport,
        Arc::clone(&settings.core),
    ));
    info!(
        "Album aggregation: quiescence {}ms, policy {:?}.",
        settings.core.album_quiescence_ms, settings.core.album_timer_policy
    );

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {e}");
    }

    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![
            settings,
            Arc::clone(&aggregator),
            intake,
            trigger,
            InMemStorage::<State>::new()
        ])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    aggregator.shutdown();
    info!("Bot stopped.");
}

/// Sessions live in memory, so any per-user directory on disk belongs to a previous run.
async fn init_staging(settings: &BotSettings) -> StagingArea {
    let staging = StagingArea::new(&settings.core.media_dir);
    let root = staging.root().to_path_buf();

    if let Err(e) = tokio::fs::create_dir_all(&root).await {
        error!("Failed to create staging root {}: {}", root.display(), e);
        std::process::exit(1);
    }

    match staging.purge_stale().await {
        Ok(0) => {}
        Ok(removed) => info!(
            "Removed {removed} leftover staging directories in {}.",
            root.display()
        ),
        Err(e) => warn!("Failed to clear leftover staging in {}: {e}", root.display()),
    }
    info!("Staging root initialized at {}.", root.display());
    staging
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .enter_dialogue::<Message, InMemStorage<State>, State>()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(
            dptree::filter(|msg: Message| msg.photo().is_some() || msg.document().is_some())
                .endpoint(handle_media),
        )
        .branch(
            dptree::case![State::AwaitingName]
                .filter(|msg: Message| msg.text().is_some())
                .endpoint(handle_awaiting_name),
        )
        .branch(dptree::endpoint(handle_other))
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    dialogue: Dialogue<State, InMemStorage<State>>,
    trigger: Arc<ConversionTrigger>,
    settings: Arc<BotSettings>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => bot::handlers::start(bot, msg, settings, dialogue).await,
        Command::Help => bot::handlers::help(bot, msg).await,
        Command::Convert(arg) => bot::handlers::convert(bot, msg, arg, trigger, settings).await,
        Command::Cancel => bot::handlers::cancel(bot, msg, trigger, dialogue).await,
        Command::Name(arg) => bot::handlers::name(bot, msg, arg, trigger, dialogue).await,
        Command::Format(arg) => bot::handlers::format(bot, msg, arg, trigger, settings).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_media(
    bot: Bot,
    msg: Message,
    aggregator: Arc<AlbumAggregator<MediaRef>>,
    intake: Arc<PhotoIntake>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_media(bot, msg, aggregator, intake).await {
        error!("Media handler error: {:#}", e);
    }
    respond(())
}

async fn handle_awaiting_name(
    bot: Bot,
    msg: Message,
    trigger: Arc<ConversionTrigger>,
    dialogue: Dialogue<State, InMemStorage<State>>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_awaiting_name(bot, msg, trigger, dialogue).await {
        error!("Name handler error: {}", e);
    }
    respond(())
}

async fn handle_other(bot: Bot, msg: Message) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_other(bot, msg).await {
        error!("Fallback handler error: {}", e);
    }
    respond(())
}
