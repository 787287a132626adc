//! End-to-end: inbound photos are aggregated, staged, rendered and delivered.

use albumdoc_core::aggregator::{AlbumAggregator, Batch, BatchHandler, InboundEvent, Submission};
use albumdoc_core::config::AlbumSettings;
use albumdoc_core::intake::PhotoIntake;
use albumdoc_core::output::OutputKind;
use albumdoc_core::render::DocumentRenderer;
use albumdoc_core::session::SessionStore;
use albumdoc_core::staging::StagingArea;
use albumdoc_core::transport::{DocumentSink, MediaRef, MediaSource};
use albumdoc_core::trigger::{ConversionTarget, ConversionTrigger};
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const USER: i64 = 77;

/// Writes a JPEG whose width identifies the file reference
struct FakeSource;

fn width_of(file_ref: &str) -> u32 {
    match file_ref {
        "A" => 30,
        "B" => 40,
        "C" => 50,
        _ => 10,
    }
}

#[async_trait]
impl MediaSource for FakeSource {
    async fn download(&self, file_ref: &str, destination: &Path) -> anyhow::Result<()> {
        let image = RgbImage::from_pixel(width_of(file_ref), 20, Rgb([200, 100, 50]));
        image.save_with_format(destination, image::ImageFormat::Jpeg)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Delivery {
    chat_id: i64,
    file_name: String,
    page_widths: Vec<i64>,
}

/// Opens each delivered PDF and records its page widths in order
#[derive(Default)]
struct RecordingSink {
    deliveries: Mutex<Vec<Delivery>>,
}

fn page_widths(document: &Path) -> anyhow::Result<Vec<i64>> {
    let pdf = lopdf::Document::load(document)?;
    let mut widths = Vec::new();
    for page_id in pdf.get_pages().values() {
        let media_box = pdf.get_object(*page_id)?.as_dict()?.get(b"MediaBox")?.as_array()?;
        widths.push(media_box[2].as_i64()?);
    }
    Ok(widths)
}

#[async_trait]
impl DocumentSink for RecordingSink {
    async fn deliver(&self, chat_id: i64, document: &Path, file_name: &str) -> anyhow::Result<()> {
        let delivery = Delivery {
            chat_id,
            file_name: file_name.to_string(),
            page_widths: page_widths(document)?,
        };
        self.deliveries
            .lock()
            .map_err(|e| anyhow::anyhow!("{e}"))?
            .push(delivery);
        Ok(())
    }
}

struct StagingHandler {
    intake: PhotoIntake,
}

#[async_trait]
impl BatchHandler<MediaRef> for StagingHandler {
    async fn handle(&self, batch: Batch<MediaRef>) -> anyhow::Result<()> {
        self.intake.stage_batch(&batch).await?;
        Ok(())
    }
}

struct App {
    _tmp: tempfile::TempDir,
    media_dir: std::path::PathBuf,
    sessions: Arc<SessionStore>,
    aggregator: AlbumAggregator<MediaRef>,
    trigger: ConversionTrigger,
    sink: Arc<RecordingSink>,
}

fn app(quiescence_ms: u64) -> anyhow::Result<App> {
    let tmp = tempfile::tempdir()?;
    let settings = Arc::new(AlbumSettings {
        media_dir: tmp.path().to_path_buf(),
        album_quiescence_ms: quiescence_ms,
        ..AlbumSettings::default()
    });
    let sessions = Arc::new(SessionStore::new());
    let sink = Arc::new(RecordingSink::default());

    let intake = PhotoIntake::from_settings(Arc::new(FakeSource), Arc::clone(&sessions), &settings);
    let aggregator = AlbumAggregator::new(
        settings.quiescence(),
        settings.album_timer_policy,
        Arc::new(StagingHandler { intake }),
    );
    let trigger = ConversionTrigger::new(
        Arc::clone(&sessions),
        StagingArea::new(&settings.media_dir),
        Arc::new(DocumentRenderer::new()),
        sink.clone(),
        Arc::clone(&settings),
    );

    Ok(App {
        media_dir: tmp.path().to_path_buf(),
        _tmp: tmp,
        sessions,
        aggregator,
        trigger,
        sink,
    })
}

async fn wait_for_staged(sessions: &SessionStore, count: usize) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(5), async {
        while sessions.get(USER).files.len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("timed out waiting for {count} staged files"))
}

fn photo(group: Option<&str>, file_ref: &str) -> InboundEvent<MediaRef> {
    match group {
        Some(group) => InboundEvent::grouped(USER, USER, group, MediaRef::photo(file_ref)),
        None => InboundEvent::single(USER, USER, MediaRef::photo(file_ref)),
    }
}

#[tokio::test]
async fn album_then_single_photo_becomes_one_ordered_pdf() -> anyhow::Result<()> {
    let app = app(50)?;

    assert_eq!(app.aggregator.submit(photo(Some("g1"), "A")).await?, Submission::Buffered);
    assert_eq!(app.aggregator.submit(photo(Some("g1"), "B")).await?, Submission::Appended);
    wait_for_staged(&app.sessions, 2).await?;
    assert_eq!(app.aggregator.pending_groups(), 0);

    assert_eq!(app.aggregator.submit(photo(None, "C")).await?, Submission::Emitted);
    assert_eq!(app.sessions.get(USER).files.len(), 3);

    let report = app
        .trigger
        .convert(ConversionTarget {
            user_id: USER,
            chat_id: USER,
            kind: Some(OutputKind::Pdf),
            fallback_name: Some("Holiday".to_string()),
        })
        .await?;

    assert_eq!(report.pages, 3);
    let deliveries = app.sink.deliveries.lock().map_err(|e| anyhow::anyhow!("{e}"))?.clone();
    assert_eq!(
        deliveries,
        vec![Delivery {
            chat_id: USER,
            file_name: "Holiday.pdf".to_string(),
            page_widths: vec![30, 40, 50],
        }]
    );
    assert!(app.sessions.get(USER).files.is_empty());
    assert!(!app.media_dir.join(USER.to_string()).exists());
    Ok(())
}

#[tokio::test]
async fn single_photo_inside_album_window_is_staged_first() -> anyhow::Result<()> {
    let app = app(300)?;

    app.aggregator.submit(photo(Some("g1"), "A")).await?;
    app.aggregator.submit(photo(Some("g1"), "B")).await?;
    // Handled inline, before the album's deadline
    app.aggregator.submit(photo(None, "C")).await?;
    assert_eq!(app.sessions.get(USER).files.len(), 1);

    wait_for_staged(&app.sessions, 3).await?;
    app.trigger
        .convert(ConversionTarget {
            user_id: USER,
            chat_id: USER,
            kind: None,
            fallback_name: None,
        })
        .await?;

    let deliveries = app.sink.deliveries.lock().map_err(|e| anyhow::anyhow!("{e}"))?.clone();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].file_name, "document.pdf");
    assert_eq!(deliveries[0].page_widths, vec![50, 30, 40]);
    Ok(())
}

#[tokio::test]
async fn cancel_discards_staged_album() -> anyhow::Result<()> {
    let app = app(20)?;

    for file_ref in ["A", "B", "C"] {
        app.aggregator.submit(photo(Some("g2"), file_ref)).await?;
    }
    wait_for_staged(&app.sessions, 3).await?;

    assert_eq!(app.trigger.cancel(USER).await?, 3);
    assert!(app.sessions.is_empty());
    assert!(!app.media_dir.join(USER.to_string()).exists());
    assert!(app.sink.deliveries.lock().map_err(|e| anyhow::anyhow!("{e}"))?.is_empty());
    Ok(())
}
