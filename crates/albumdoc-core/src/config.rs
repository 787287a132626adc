//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the transport tuning constants.

use crate::aggregator::TimerPolicy;
use crate::output::OutputKind;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Core settings loaded from environment variables and config files
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AlbumSettings {
    /// Root directory for per-user staging directories
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,

    /// Quiescence latency of the album aggregator, in milliseconds
    #[serde(default = "default_album_quiescence_ms")]
    pub album_quiescence_ms: u64,

    /// How the album timer reacts to late arrivals
    #[serde(default)]
    pub album_timer_policy: TimerPolicy,

    /// Comma-separated list of output kinds users may request
    #[serde(rename = "output_kinds")]
    pub output_kinds_str: Option<String>,

    /// Output kind used when the user has not chosen one
    #[serde(default = "default_output_kind")]
    pub default_output_kind: OutputKind,

    /// File stem used when neither the user nor the transport supplies a name
    pub default_output_name: Option<String>,

    /// Comma-separated allow-list of image file extensions for document uploads
    #[serde(rename = "image_extensions")]
    pub image_extensions_str: Option<String>,

    /// Keep the chosen output name and kind after a conversion or cancellation
    #[serde(default)]
    pub keep_output_name: bool,
}

impl Default for AlbumSettings {
    fn default() -> Self {
        Self {
            media_dir: default_media_dir(),
            album_quiescence_ms: default_album_quiescence_ms(),
            album_timer_policy: TimerPolicy::default(),
            output_kinds_str: None,
            default_output_kind: default_output_kind(),
            default_output_name: None,
            image_extensions_str: None,
            keep_output_name: false,
        }
    }
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("media")
}

const fn default_album_quiescence_ms() -> u64 {
    DEFAULT_ALBUM_QUIESCENCE_MS
}

const fn default_output_kind() -> OutputKind {
    OutputKind::Pdf
}

/// Build the layered configuration shared by the core and the transports.
///
/// Sources, later ones overriding earlier ones: `config/default`,
/// `config/{RUN_MODE}`, `config/local`, `APP__`-prefixed environment
/// variables and finally plain environment variables.
///
/// # Errors
///
/// Returns a `ConfigError` if a source cannot be read.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Local overrides, not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // UPPER_SNAKE_CASE is mapped to snake_case; empty values count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl AlbumSettings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use albumdoc_core::config::AlbumSettings;
    ///
    /// let settings = AlbumSettings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// Aggregator quiescence latency
    #[must_use]
    pub const fn quiescence(&self) -> Duration {
        Duration::from_millis(self.album_quiescence_ms)
    }

    /// Output kinds users may request. Unknown entries are skipped.
    ///
    /// Falls back to every known kind when unset or when nothing parses.
    #[must_use]
    pub fn supported_output_kinds(&self) -> Vec<OutputKind> {
        let mut kinds: Vec<OutputKind> = Vec::new();
        for token in split_list(self.output_kinds_str.as_deref()) {
            match token.parse::<OutputKind>() {
                Ok(kind) if !kinds.contains(&kind) => kinds.push(kind),
                Ok(_) => {}
                Err(e) => warn!("Ignoring configured output kind: {e}"),
            }
        }
        if kinds.is_empty() {
            return OutputKind::ALL.to_vec();
        }
        kinds
    }

    /// Lowercase image extensions accepted for document uploads
    #[must_use]
    pub fn allowed_extensions(&self) -> HashSet<String> {
        let configured: HashSet<String> = split_list(self.image_extensions_str.as_deref())
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        if configured.is_empty() {
            return DEFAULT_IMAGE_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect();
        }
        configured
    }
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|token| !token.is_empty())
}

/// Default aggregator quiescence latency
pub const DEFAULT_ALBUM_QUIESCENCE_MS: u64 = 50;

/// Image extensions accepted when `IMAGE_EXTENSIONS` is not configured
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "webp", "bmp", "gif", "tif", "tiff"];

// Transport retry configuration
/// Initial backoff for transport API retries
pub const TRANSPORT_INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound for a single backoff step
pub const TRANSPORT_MAX_BACKOFF_MS: u64 = 4000;
/// Number of retries after the first attempt
pub const TRANSPORT_MAX_RETRIES: usize = 3;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Environment is process-global; keep all env-driven checks in one test
    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("MEDIA_DIR", "/tmp/albumdoc-media");
        env::set_var("ALBUM_QUIESCENCE_MS", "120");
        env::set_var("ALBUM_TIMER_POLICY", "reset_on_arrival");
        env::set_var("DEFAULT_OUTPUT_KIND", "docx");

        let settings = AlbumSettings::new()?;
        assert_eq!(settings.media_dir, PathBuf::from("/tmp/albumdoc-media"));
        assert_eq!(settings.quiescence(), Duration::from_millis(120));
        assert_eq!(settings.album_timer_policy, TimerPolicy::ResetOnArrival);
        assert_eq!(settings.default_output_kind, OutputKind::Docx);

        env::remove_var("MEDIA_DIR");
        env::remove_var("ALBUM_QUIESCENCE_MS");
        env::remove_var("ALBUM_TIMER_POLICY");
        env::remove_var("DEFAULT_OUTPUT_KIND");

        // Empty values are treated as unset
        env::set_var("MEDIA_DIR", "");
        let settings = AlbumSettings::new()?;
        assert_eq!(settings.media_dir, PathBuf::from("media"));
        assert_eq!(settings.album_quiescence_ms, DEFAULT_ALBUM_QUIESCENCE_MS);
        assert_eq!(settings.album_timer_policy, TimerPolicy::ArmOnce);
        env::remove_var("MEDIA_DIR");
        Ok(())
    }

    #[test]
    fn test_output_kinds_parsing() {
        let mut settings = AlbumSettings::default();
        assert_eq!(settings.supported_output_kinds(), OutputKind::ALL.to_vec());

        settings.output_kinds_str = Some("docx".to_string());
        assert_eq!(settings.supported_output_kinds(), vec![OutputKind::Docx]);

        settings.output_kinds_str = Some("pdf; docx, pdf".to_string());
        assert_eq!(
            settings.supported_output_kinds(),
            vec![OutputKind::Pdf, OutputKind::Docx]
        );

        // Nothing usable falls back to all kinds
        settings.output_kinds_str = Some("odt rtf".to_string());
        assert_eq!(settings.supported_output_kinds(), OutputKind::ALL.to_vec());
    }

    #[test]
    fn test_extension_parsing() {
        let mut settings = AlbumSettings::default();
        assert!(settings.allowed_extensions().contains("jpeg"));
        assert!(settings.allowed_extensions().contains("png"));

        settings.image_extensions_str = Some(".JPG, png;heic".to_string());
        let allowed = settings.allowed_extensions();
        assert_eq!(allowed.len(), 3);
        assert!(allowed.contains("jpg"));
        assert!(allowed.contains("png"));
        assert!(allowed.contains("heic"));
        assert!(!allowed.contains("gif"));
    }
}
