//! Data types flowing through the pipeline and returned to callers.

use crate::error::{ConversionError, ResolutionError, SlideError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One unit of conversion work: a single slide document.
#[derive(Debug, Clone)]
pub struct Job {
    /// Slide identifier from the descriptor.
    pub id: String,
    /// Where the document was read from; relative assets resolve against
    /// its directory.
    pub source_path: PathBuf,
    /// Raw markup, never modified after reading.
    pub source_document: String,
    /// Position in the caller-specified order.
    pub sequence_index: usize,
}

impl Job {
    /// Directory that relative asset URLs in the document resolve against.
    pub fn base_dir(&self) -> &Path {
        self.source_path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Viewport and measured size of one rendered slide, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub requested_width: u32,
    pub requested_height: u32,
    pub measured_content_height: u32,
}

impl PageGeometry {
    /// Geometry before measurement: content assumed to fit the viewport.
    pub fn requested(width: u32, height: u32) -> Self {
        Self {
            requested_width: width,
            requested_height: height,
            measured_content_height: height,
        }
    }

    /// Record the measured content height.
    pub fn with_measured(self, measured: u32) -> Self {
        Self {
            measured_content_height: measured,
            ..self
        }
    }

    /// Page height actually printed. Never smaller than the viewport, never
    /// smaller than the content.
    pub fn effective_height(&self) -> u32 {
        self.requested_height.max(self.measured_content_height)
    }

    /// Whether the viewport must be re-applied before printing.
    pub fn overflows(&self) -> bool {
        self.measured_content_height > self.requested_height
    }

    /// Page width in inches (96 CSS px per inch).
    pub fn paper_width_in(&self) -> f64 {
        px_to_inches(self.requested_width)
    }

    /// Page height in inches, from the effective height.
    pub fn paper_height_in(&self) -> f64 {
        px_to_inches(self.effective_height())
    }
}

/// CSS reference pixels per inch.
pub const CSS_PX_PER_INCH: f64 = 96.0;

pub fn px_to_inches(px: u32) -> f64 {
    px as f64 / CSS_PX_PER_INCH
}

/// Outcome of rendering one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenderOutcome {
    Success {
        artifact_path: PathBuf,
        page_width: u32,
        page_height: u32,
    },
    Failure {
        reason: SlideError,
        attempts: u32,
    },
}

/// Result of one job; exactly one exists per submitted [`Job`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderResult {
    pub sequence_index: usize,
    pub id: String,
    pub outcome: RenderOutcome,
    /// Wall-clock time spent on this slide, retries and backoff included.
    pub duration_ms: u64,
    /// Icon glyphs swapped for inline vectors in this slide.
    #[serde(default)]
    pub glyphs_replaced: usize,
    /// Icon glyphs left as-is because the catalog had no match.
    #[serde(default)]
    pub glyphs_unresolved: usize,
}

impl RenderResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RenderOutcome::Success { .. })
    }

    /// Path of the rendered page, if the slide succeeded.
    pub fn artifact_path(&self) -> Option<&Path> {
        match &self.outcome {
            RenderOutcome::Success { artifact_path, .. } => Some(artifact_path),
            RenderOutcome::Failure { .. } => None,
        }
    }
}

/// A slide left out of the merged deck, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OmittedSlide {
    pub id: String,
    pub sequence_index: usize,
    pub reason: String,
    pub attempts: u32,
}

/// How the run went overall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every submitted slide is in the merged deck.
    Complete,
    /// Some slides were omitted.
    Partial { succeeded: usize, total: usize },
}

impl RunStatus {
    pub fn from_counts(succeeded: usize, total: usize) -> Self {
        if succeeded == total {
            RunStatus::Complete
        } else {
            RunStatus::Partial { succeeded, total }
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Complete => write!(f, "complete success"),
            RunStatus::Partial { succeeded, total } => {
                write!(f, "partial success ({succeeded} of {total} slides)")
            }
        }
    }
}

/// Counters and timings for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Slide ids listed in the descriptor.
    pub requested_slides: usize,
    /// Slides that resolved to a document and were scheduled.
    pub scheduled_slides: usize,
    pub rendered_slides: usize,
    pub failed_slides: usize,
    pub unresolved_slides: usize,
    pub glyphs_replaced: usize,
    pub glyphs_unresolved: usize,
    pub total_duration_ms: u64,
    pub render_duration_ms: u64,
    pub merge_duration_ms: u64,
    pub conversion_duration_ms: u64,
}

/// Everything a run produced.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// The merged multi-page PDF.
    pub merged_pdf: PathBuf,
    /// The presentation file, when conversion ran and succeeded.
    pub pptx: Option<PathBuf>,
    /// One entry per scheduled slide, in slide order.
    pub slides: Vec<RenderResult>,
    /// Scheduled slides left out of the merged deck.
    pub omitted: Vec<OmittedSlide>,
    /// Slide ids without a source document.
    pub unresolved: Vec<ResolutionError>,
    /// Set when the PPTX step failed; `merged_pdf` is still valid.
    pub conversion_error: Option<ConversionError>,
    pub status: RunStatus,
    pub stats: ConversionStats,
}
