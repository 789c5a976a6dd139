//! Per-slide rendering: transform, stage, then drive the engine with retries.
//!
//! ## Attempt state machine
//!
//! ```text
//! Attempting(1) ──ok──▶ Succeeded
//!      │
//!      └─err─▶ Attempting(n+1) ... ──err, n = max──▶ Exhausted
//! ```
//!
//! Every attempt runs in a brand-new engine session and the session is closed
//! whatever the attempt's outcome. Failures never escape [`render_job`]: it
//! always returns a [`RenderResult`], so one broken slide cannot take its
//! siblings down.
//!
//! ## Height correction
//!
//! Slides are authored for a fixed viewport but some overflow it. After load
//! and a settle delay the content element is measured; if it is taller than
//! the viewport, the viewport is grown to match before printing so the page
//! holds the whole slide instead of clipping or spilling onto a second page.

use crate::config::DeckConfig;
use crate::error::{RenderAttemptError, SlideError};
use crate::output::{Job, PageGeometry, RenderOutcome, RenderResult};
use crate::pipeline::engine::{EngineSession, RenderEngine, Viewport};
use crate::pipeline::icons::IconCatalog;
use crate::pipeline::transform::{transform, TransformStats};
use crate::progress::ProgressCallback;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Allowance for measure and print on top of load timeout and settle delay.
const PRINT_ALLOWANCE: Duration = Duration::from_secs(30);

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// State after attempt `attempt` failed.
    pub fn after_failure(&self, attempt: u32, error: String) -> AttemptState {
        if attempt < self.max_attempts {
            AttemptState::Attempting(attempt + 1)
        } else {
            AttemptState::Exhausted {
                attempts: attempt,
                last_error: error,
            }
        }
    }
}

/// Where a slide is in its retry cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState {
    /// About to run attempt `n` (1-based).
    Attempting(u32),
    Succeeded { geometry: PageGeometry, attempts: u32 },
    Exhausted { attempts: u32, last_error: String },
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptState::Attempting(_))
    }
}

/// Engine settings shared by every attempt.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub viewport: Viewport,
    pub load_timeout: Duration,
    pub settle_delay: Duration,
    pub content_selector: String,
    pub retry: RetryPolicy,
}

impl RenderOptions {
    pub fn from_config(config: &DeckConfig) -> Self {
        Self {
            viewport: Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
            },
            load_timeout: config.load_timeout(),
            settle_delay: config.settle_delay(),
            content_selector: config.content_selector.clone(),
            retry: config.retry_policy(),
        }
    }

    /// Hard ceiling on one attempt; past it the engine is treated as hung.
    fn attempt_deadline(&self) -> Duration {
        self.load_timeout + self.settle_delay + PRINT_ALLOWANCE
    }
}

/// Everything a worker needs to render one job.
pub struct RenderContext {
    pub engine: Arc<dyn RenderEngine>,
    pub catalog: Arc<IconCatalog>,
    pub options: RenderOptions,
    /// Where per-slide PDFs are written.
    pub slides_dir: PathBuf,
    /// Keep the transformed HTML beside the source after the run.
    pub keep_intermediates: bool,
    pub progress: Option<ProgressCallback>,
    /// Number of scheduled jobs, for progress reporting.
    pub total: usize,
}

/// Render one document to `output`, retrying per `options.retry`.
///
/// Returns a terminal [`AttemptState`]. `on_retry` is called with the
/// attempt number that just failed and its error before each backoff.
pub async fn render_document(
    engine: &dyn RenderEngine,
    document: &Path,
    output: &Path,
    options: &RenderOptions,
    mut on_retry: impl FnMut(u32, &str),
) -> AttemptState {
    let mut state = AttemptState::Attempting(1);
    while let AttemptState::Attempting(n) = state {
        state = match attempt_once(engine, document, output, options).await {
            Ok(geometry) => AttemptState::Succeeded {
                geometry,
                attempts: n,
            },
            Err(e) => {
                let msg = e.to_string();
                warn!(document = %document.display(), attempt = n, "Render attempt failed: {msg}");
                let next = options.retry.after_failure(n, msg);
                if !next.is_terminal() {
                    on_retry(n, &e.to_string());
                    if !options.retry.backoff.is_zero() {
                        sleep(options.retry.backoff).await;
                    }
                }
                next
            }
        };
    }
    state
}

/// One attempt: launch, drive, and always close.
async fn attempt_once(
    engine: &dyn RenderEngine,
    document: &Path,
    output: &Path,
    options: &RenderOptions,
) -> Result<PageGeometry, RenderAttemptError> {
    let mut session = engine.launch(options.viewport).await?;
    let deadline = options.attempt_deadline();
    let result = match timeout(deadline, drive(session.as_mut(), document, output, options)).await {
        Ok(result) => result,
        Err(_) => Err(RenderAttemptError::Hung {
            secs: deadline.as_secs(),
        }),
    };
    session.close().await;
    result
}

async fn drive(
    session: &mut dyn EngineSession,
    document: &Path,
    output: &Path,
    options: &RenderOptions,
) -> Result<PageGeometry, RenderAttemptError> {
    session.load(document, options.load_timeout).await?;
    if !options.settle_delay.is_zero() {
        sleep(options.settle_delay).await;
    }

    let measured = session.content_height(&options.content_selector).await?;
    let geometry = PageGeometry::requested(options.viewport.width, options.viewport.height)
        .with_measured(measured);

    if geometry.overflows() {
        debug!(
            document = %document.display(),
            viewport_height = options.viewport.height,
            content_height = measured,
            "Content overflows viewport; growing page"
        );
        session
            .set_viewport(Viewport {
                width: options.viewport.width,
                height: geometry.effective_height(),
            })
            .await?;
    }

    session.print_pdf(&geometry, output).await?;
    Ok(geometry)
}

/// Render one job end to end. Never fails: errors become a
/// [`RenderOutcome::Failure`].
pub async fn render_job(job: Job, ctx: &RenderContext) -> RenderResult {
    let start = Instant::now();
    let index = job.sequence_index;
    if let Some(cb) = &ctx.progress {
        cb.on_slide_start(&job.id, index, ctx.total);
    }

    let (outcome, stats) = render_job_inner(&job, ctx).await;

    match &outcome {
        RenderOutcome::Success { page_height, .. } => {
            info!(slide = %job.id, index, page_height, "Slide rendered");
            if let Some(cb) = &ctx.progress {
                cb.on_slide_complete(&job.id, index, ctx.total, *page_height);
            }
        }
        RenderOutcome::Failure { reason, attempts } => {
            warn!(slide = %job.id, index, attempts, "Slide failed: {reason}");
            if let Some(cb) = &ctx.progress {
                cb.on_slide_error(&job.id, index, ctx.total, &reason.to_string());
            }
        }
    }

    RenderResult {
        sequence_index: index,
        id: job.id,
        outcome,
        duration_ms: start.elapsed().as_millis() as u64,
        glyphs_replaced: stats.glyphs_replaced,
        glyphs_unresolved: stats.glyphs_unresolved,
    }
}

async fn render_job_inner(job: &Job, ctx: &RenderContext) -> (RenderOutcome, TransformStats) {
    let transformed = match transform(&job.source_document, &ctx.catalog) {
        Ok(t) => t,
        Err(e) => return (prep_failure(job, e.to_string()), TransformStats::default()),
    };
    let stats = transformed.stats;
    debug!(
        slide = %job.id,
        glyphs_replaced = stats.glyphs_replaced,
        glyphs_unresolved = stats.glyphs_unresolved,
        selectors_rewritten = stats.selectors_rewritten,
        "Document transformed"
    );

    let staged = match StagedDocument::write(job, &transformed.html, ctx.keep_intermediates) {
        Ok(s) => s,
        Err(e) => {
            let detail = format!("could not stage transformed document: {e}");
            return (prep_failure(job, detail), stats);
        }
    };

    let artifact = ctx.slides_dir.join(slide_pdf_name(job));
    let progress = ctx.progress.clone();
    let max_attempts = ctx.options.retry.max_attempts;
    let state = render_document(
        ctx.engine.as_ref(),
        staged.path(),
        &artifact,
        &ctx.options,
        |attempt, error| {
            if let Some(cb) = &progress {
                cb.on_slide_retry(&job.id, attempt, max_attempts, error);
            }
        },
    )
    .await;
    drop(staged);

    let outcome = match state {
        AttemptState::Succeeded { geometry, .. } => RenderOutcome::Success {
            artifact_path: artifact,
            page_width: geometry.requested_width,
            page_height: geometry.effective_height(),
        },
        AttemptState::Exhausted {
            attempts,
            last_error,
        } => {
            // A failed print may leave a partial file behind.
            let _ = tokio::fs::remove_file(&artifact).await;
            RenderOutcome::Failure {
                reason: SlideError::RenderExhausted {
                    id: job.id.clone(),
                    attempts,
                    detail: last_error,
                },
                attempts,
            }
        }
        AttemptState::Attempting(_) => unreachable!("render_document returns terminal states"),
    };
    (outcome, stats)
}

fn prep_failure(job: &Job, detail: String) -> RenderOutcome {
    RenderOutcome::Failure {
        reason: SlideError::Transform {
            id: job.id.clone(),
            detail,
        },
        attempts: 0,
    }
}

/// `NNN-<id>.pdf`, numbered from 1 so a directory listing sorts in deck order.
pub fn slide_pdf_name(job: &Job) -> String {
    format!("{:03}-{}.pdf", job.sequence_index + 1, sanitize_id(&job.id))
}

/// `.NNN-<id>.html2pptx.html`: the retained transformed document. Numbered
/// like [`slide_pdf_name`] so ids that sanitize alike never share a file.
fn kept_document_name(job: &Job) -> String {
    format!(".{:03}-{}.html2pptx.html", job.sequence_index + 1, sanitize_id(&job.id))
}

/// Keep ids usable as file names.
fn sanitize_id(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "slide".to_string()
    } else {
        cleaned
    }
}

/// The transformed markup on disk, next to its source so relative asset
/// URLs still resolve.
enum StagedDocument {
    /// Deleted on drop.
    Temporary(tempfile::NamedTempFile),
    Kept(PathBuf),
}

impl StagedDocument {
    fn write(job: &Job, html: &str, keep: bool) -> std::io::Result<Self> {
        let dir = job.base_dir();
        if keep {
            let path = dir.join(kept_document_name(job));
            std::fs::write(&path, html)?;
            return Ok(StagedDocument::Kept(path));
        }
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{}-", sanitize_id(&job.id)))
            .suffix(".html2pptx.html")
            .tempfile_in(dir)?;
        tmp.write_all(html.as_bytes())?;
        tmp.flush()?;
        Ok(StagedDocument::Temporary(tmp))
    }

    fn path(&self) -> &Path {
        match self {
            StagedDocument::Temporary(tmp) => tmp.path(),
            StagedDocument::Kept(path) => path,
        }
    }
}
