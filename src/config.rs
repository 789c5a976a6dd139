//! Configuration types for HTML-deck conversion.
//!
//! Every knob lives in [`DeckConfig`], built via [`DeckConfigBuilder`].
//! Unset fields keep documented defaults; `build()` rejects values the
//! renderer cannot honour.

use crate::error::DeckError;
use crate::pipeline::render::RetryPolicy;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Smallest and largest accepted viewport edge, in CSS pixels.
const MIN_VIEWPORT_PX: u32 = 100;
const MAX_VIEWPORT_PX: u32 = 10_000;

/// Configuration for converting a slide deck.
///
/// # Example
/// ```rust
/// use html2pptx::DeckConfig;
///
/// let config = DeckConfig::builder()
///     .viewport(1920, 1080)
///     .concurrency(2)
///     .pdf_only(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.viewport_height, 1080);
/// ```
#[derive(Clone)]
pub struct DeckConfig {
    /// Viewport width in CSS pixels; also the printed page width. Default: 1280.
    pub viewport_width: u32,

    /// Viewport height in CSS pixels. Default: 720.
    ///
    /// A floor for the printed page height: slides whose content is taller
    /// get a taller page instead of being clipped.
    pub viewport_height: u32,

    /// Maximum number of browser instances alive at once. Default: 4.
    ///
    /// Each instance is a full Chromium process tree, so this bounds peak
    /// memory regardless of deck length.
    pub concurrency: usize,

    /// Total render attempts per slide. Default: 3.
    pub max_retries: u32,

    /// Fixed delay between attempts in milliseconds. Default: 2000.
    pub retry_backoff_ms: u64,

    /// Navigation timeout per attempt, in seconds. Default: 10.
    pub load_timeout_secs: u64,

    /// Pause after load for fonts and images to settle, in ms. Default: 1000.
    pub settle_delay_ms: u64,

    /// CSS selector of the element whose height decides the page height.
    /// Falls back to `<body>` when nothing matches. Default: `.slide-container`.
    pub content_selector: String,

    /// Directory for the merged PDF and PPTX. Default: `output`.
    pub output_dir: PathBuf,

    /// File stem of the merged outputs. Default: `presentation`.
    pub output_name: String,

    /// Stop after the merged PDF; skip the PPTX step. Default: false.
    pub pdf_only: bool,

    /// Keep per-slide PDFs and transformed HTML after the run. Default: false.
    pub keep_intermediates: bool,

    /// Chromium executable. When None the engine searches the usual locations.
    pub chrome_executable: Option<PathBuf>,

    /// Office converter binary. Default: `soffice`.
    pub soffice_path: PathBuf,

    /// Extra icon catalog merged over the bundled one.
    pub icon_catalog: Option<PathBuf>,

    /// Optional per-slide progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            viewport_width: 1280,
            viewport_height: 720,
            concurrency: 4,
            max_retries: 3,
            retry_backoff_ms: 2000,
            load_timeout_secs: 10,
            settle_delay_ms: 1000,
            content_selector: ".slide-container".to_string(),
            output_dir: PathBuf::from("output"),
            output_name: "presentation".to_string(),
            pdf_only: false,
            keep_intermediates: false,
            chrome_executable: None,
            soffice_path: PathBuf::from("soffice"),
            icon_catalog: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DeckConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeckConfig")
            .field("viewport_width", &self.viewport_width)
            .field("viewport_height", &self.viewport_height)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("load_timeout_secs", &self.load_timeout_secs)
            .field("settle_delay_ms", &self.settle_delay_ms)
            .field("content_selector", &self.content_selector)
            .field("output_dir", &self.output_dir)
            .field("output_name", &self.output_name)
            .field("pdf_only", &self.pdf_only)
            .field("keep_intermediates", &self.keep_intermediates)
            .field("chrome_executable", &self.chrome_executable)
            .field("soffice_path", &self.soffice_path)
            .field("icon_catalog", &self.icon_catalog)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl DeckConfig {
    /// Create a new builder for `DeckConfig`.
    pub fn builder() -> DeckConfigBuilder {
        DeckConfigBuilder {
            config: Self::default(),
        }
    }

    /// Retry bound and backoff derived from this config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Path of the merged PDF.
    pub fn merged_pdf_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.pdf", self.output_name))
    }

    /// Directory holding per-slide PDFs.
    pub fn slides_dir(&self) -> PathBuf {
        self.output_dir.join(".slides")
    }
}

/// Builder for [`DeckConfig`].
pub struct DeckConfigBuilder {
    config: DeckConfig,
}

impl fmt::Debug for DeckConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeckConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl DeckConfigBuilder {
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.viewport_width = width;
        self.config.viewport_height = height;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn load_timeout_secs(mut self, secs: u64) -> Self {
        self.config.load_timeout_secs = secs;
        self
    }

    pub fn settle_delay_ms(mut self, ms: u64) -> Self {
        self.config.settle_delay_ms = ms;
        self
    }

    pub fn content_selector(mut self, selector: impl Into<String>) -> Self {
        self.config.content_selector = selector.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.config.output_name = name.into();
        self
    }

    pub fn pdf_only(mut self, v: bool) -> Self {
        self.config.pdf_only = v;
        self
    }

    pub fn keep_intermediates(mut self, v: bool) -> Self {
        self.config.keep_intermediates = v;
        self
    }

    pub fn chrome_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_executable = Some(path.into());
        self
    }

    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = path.into();
        self
    }

    pub fn icon_catalog(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.icon_catalog = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DeckConfig, DeckError> {
        let c = &self.config;
        for (name, px) in [("width", c.viewport_width), ("height", c.viewport_height)] {
            if !(MIN_VIEWPORT_PX..=MAX_VIEWPORT_PX).contains(&px) {
                return Err(DeckError::InvalidConfig(format!(
                    "Viewport {name} must be {MIN_VIEWPORT_PX}–{MAX_VIEWPORT_PX}px, got {px}"
                )));
            }
        }
        if c.concurrency == 0 {
            return Err(DeckError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.max_retries == 0 {
            return Err(DeckError::InvalidConfig(
                "At least one render attempt is required".into(),
            ));
        }
        if c.content_selector.trim().is_empty() {
            return Err(DeckError::InvalidConfig(
                "Content selector must not be empty".into(),
            ));
        }
        if c.output_name.trim().is_empty() || c.output_name.contains(['/', '\\']) {
            return Err(DeckError::InvalidConfig(format!(
                "Output name must be a plain file stem, got '{}'",
                c.output_name
            )));
        }
        Ok(self.config)
    }
}
