//! Top-level conversion entry points.
//!
//! A run resolves the descriptor, renders every slide with bounded
//! concurrency, merges the successes into one PDF and, unless `pdf_only`,
//! converts that PDF to PPTX. Only setup problems and a run with zero
//! successful slides are fatal; everything else is reported in
//! [`ConversionOutput`].

use crate::config::DeckConfig;
use crate::error::{AssemblyError, DeckError};
use crate::output::{ConversionOutput, ConversionStats, RenderOutcome, RenderResult};
use crate::pipeline::assemble::{self, PageMerger, PdfiumMerger};
use crate::pipeline::engine::{ChromiumEngine, RenderEngine};
use crate::pipeline::icons::IconCatalog;
use crate::pipeline::input::{self, DeckInspection};
use crate::pipeline::office::{DocumentConverter, SofficeConverter};
use crate::pipeline::render::{self, RenderContext, RenderOptions};
use crate::pipeline::schedule;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The external programs a run talks to.
///
/// [`convert`] uses Chromium, pdfium and LibreOffice; [`convert_with`]
/// accepts any implementations, which is how the pipeline is tested.
#[derive(Clone)]
pub struct Collaborators {
    pub engine: Arc<dyn RenderEngine>,
    pub merger: Arc<dyn PageMerger>,
    pub converter: Arc<dyn DocumentConverter>,
}

impl Collaborators {
    /// Production collaborators configured from `config`.
    pub fn from_config(config: &DeckConfig) -> Self {
        Self {
            engine: Arc::new(ChromiumEngine::new(config.chrome_executable.clone())),
            merger: Arc::new(PdfiumMerger::from_env()),
            converter: Arc::new(SofficeConverter::new(config.soffice_path.clone())),
        }
    }
}

/// Convert the deck described at `descriptor_path`.
///
/// # Returns
/// `Ok(ConversionOutput)` whenever at least one slide made it into the
/// merged PDF, including partial runs and runs where the PPTX step failed
/// (see `output.status` and `output.conversion_error`).
///
/// # Errors
/// Returns `Err(DeckError)` only for fatal errors:
/// - descriptor missing or malformed
/// - no slide resolves to a document
/// - output directory cannot be created
/// - every slide failed, or the merge itself failed
pub async fn convert(
    descriptor_path: impl AsRef<Path>,
    config: &DeckConfig,
) -> Result<ConversionOutput, DeckError> {
    convert_with(descriptor_path, config, &Collaborators::from_config(config)).await
}

/// [`convert`] with caller-supplied engine, merger and converter.
pub async fn convert_with(
    descriptor_path: impl AsRef<Path>,
    config: &DeckConfig,
    collaborators: &Collaborators,
) -> Result<ConversionOutput, DeckError> {
    let total_start = Instant::now();
    let descriptor_path = descriptor_path.as_ref();
    info!("Starting conversion: {}", descriptor_path.display());

    // ── Step 1: Resolve slides ───────────────────────────────────────────
    let deck = input::resolve_deck(descriptor_path).await?;
    if deck.jobs.is_empty() {
        return Err(DeckError::NoResolvableSlides {
            path: descriptor_path.to_path_buf(),
            requested: deck.requested,
        });
    }
    let scheduled = deck.jobs.len();

    // ── Step 2: Icon catalog ─────────────────────────────────────────────
    let catalog = IconCatalog::with_overrides(config.icon_catalog.as_deref())?;
    debug!("Icon catalog holds {} glyphs", catalog.len());

    // ── Step 3: Output locations ─────────────────────────────────────────
    let slides_dir = config.slides_dir();
    for dir in [&config.output_dir, &slides_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| DeckError::OutputDirFailed {
                path: dir.to_path_buf(),
                source: e,
            })?;
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(scheduled);
    }

    // ── Step 4: Render with bounded concurrency ──────────────────────────
    let ctx = Arc::new(RenderContext {
        engine: Arc::clone(&collaborators.engine),
        catalog: Arc::new(catalog),
        options: RenderOptions::from_config(config),
        slides_dir: slides_dir.clone(),
        keep_intermediates: config.keep_intermediates,
        progress: config.progress_callback.clone(),
        total: scheduled,
    });

    let render_start = Instant::now();
    let slides: Vec<RenderResult> = schedule::run(deck.jobs, config.concurrency, |job| {
        let ctx = Arc::clone(&ctx);
        async move { render::render_job(job, &ctx).await }
    })
    .await;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    let rendered = slides.iter().filter(|r| r.is_success()).count();
    info!(
        "Rendered {}/{} slides in {}ms",
        rendered, scheduled, render_duration_ms
    );

    // ── Step 5: Merge ────────────────────────────────────────────────────
    let merged_path = config.merged_pdf_path();
    let merge_start = Instant::now();
    let assembled = assemble::assemble(&slides, &merged_path, collaborators.merger.as_ref()).await;
    let merge_duration_ms = merge_start.elapsed().as_millis() as u64;

    // Per-slide pages are the only copy of the work when the merge fails.
    let merge_failed = matches!(assembled, Err(AssemblyError::Merge(_)));
    if merge_failed {
        warn!("Merge failed; keeping per-slide pages in {}", slides_dir.display());
    } else if !config.keep_intermediates {
        remove_intermediates(&slides_dir).await;
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(scheduled, rendered);
    }

    let assembly = assembled.map_err(|e| match e {
        AssemblyError::NoSuccessfulSlides { total } => {
            let first_error = slides
                .iter()
                .find_map(|r| match &r.outcome {
                    RenderOutcome::Failure { reason, .. } => Some(reason.to_string()),
                    RenderOutcome::Success { .. } => None,
                })
                .unwrap_or_else(|| "Unknown error".to_string());
            DeckError::AllSlidesFailed { total, first_error }
        }
        AssemblyError::Merge(detail) => DeckError::MergeFailed {
            path: merged_path.clone(),
            detail,
        },
    })?;

    // ── Step 6: Presentation ─────────────────────────────────────────────
    let conversion_start = Instant::now();
    let (pptx, conversion_error) = if config.pdf_only {
        debug!("PDF-only mode: skipping presentation conversion");
        (None, None)
    } else {
        match collaborators.converter.convert(&assembly.artifact.path).await {
            Ok(path) => (Some(path), None),
            Err(e) => {
                warn!("Presentation conversion failed, merged PDF kept: {e}");
                (None, Some(e))
            }
        }
    };
    let conversion_duration_ms = conversion_start.elapsed().as_millis() as u64;

    // ── Step 7: Stats ────────────────────────────────────────────────────
    let stats = ConversionStats {
        requested_slides: deck.requested,
        scheduled_slides: scheduled,
        rendered_slides: rendered,
        failed_slides: scheduled - rendered,
        unresolved_slides: deck.unresolved.len(),
        glyphs_replaced: slides.iter().map(|r| r.glyphs_replaced).sum(),
        glyphs_unresolved: slides.iter().map(|r| r.glyphs_unresolved).sum(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        render_duration_ms,
        merge_duration_ms,
        conversion_duration_ms,
    };

    info!(
        "Conversion complete ({}): {}/{} slides, {}ms total",
        assembly.status, rendered, scheduled, stats.total_duration_ms
    );

    Ok(ConversionOutput {
        merged_pdf: assembly.artifact.path,
        pptx,
        slides,
        omitted: assembly.omitted,
        unresolved: deck.unresolved,
        conversion_error,
        status: assembly.status,
        stats,
    })
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    descriptor_path: impl AsRef<Path>,
    config: &DeckConfig,
) -> Result<ConversionOutput, DeckError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DeckError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(descriptor_path, config))
}

/// Report how each slide of a descriptor resolves, without rendering.
///
/// Needs neither a browser nor LibreOffice.
pub async fn inspect(descriptor_path: impl AsRef<Path>) -> Result<DeckInspection, DeckError> {
    input::inspect_deck(descriptor_path.as_ref()).await
}

async fn remove_intermediates(slides_dir: &Path) {
    match tokio::fs::remove_dir_all(slides_dir).await {
        Ok(()) => debug!("Removed {}", slides_dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", slides_dir.display(), e),
    }
}
