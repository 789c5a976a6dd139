//! Error types for the html2pptx library.
//!
//! Failures fall into tiers that mirror where they are contained:
//!
//! * [`DeckError`] — **Fatal**: the run cannot proceed at all (descriptor
//!   missing, zero resolvable slides, output directory uncreatable). Returned
//!   as `Err(DeckError)` from the top-level `convert*` functions.
//!
//! * [`ResolutionError`] — one slide id has no source document. The slide is
//!   excluded from the job list and the run continues.
//!
//! * [`RenderAttemptError`] — one render attempt failed (engine crash,
//!   navigation timeout, print fault). Retried up to the configured bound and
//!   never seen outside the renderer.
//!
//! * [`SlideError`] — **Non-fatal**: a single slide failed for good. Stored
//!   inside [`crate::output::RenderOutcome::Failure`] so one bad slide never
//!   aborts its siblings.
//!
//! * [`AssemblyError`] / [`ConversionError`] — the merge and final-format
//!   steps. A converter failure leaves the merged PDF in place.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the html2pptx library.
///
/// Slide-level failures use [`SlideError`] and are stored in
/// [`crate::output::RenderResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum DeckError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The slide descriptor was not found at the given path.
    #[error("Slide descriptor not found: '{path}'\nCheck the path exists and is readable.")]
    DescriptorNotFound { path: PathBuf },

    /// The descriptor exists but could not be read or parsed.
    #[error("Slide descriptor '{path}' is invalid: {detail}")]
    DescriptorInvalid { path: PathBuf, detail: String },

    /// No slide id resolved to a source document.
    #[error("None of the {requested} slides in '{path}' resolved to an HTML document")]
    NoResolvableSlides { path: PathBuf, requested: usize },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The output directory could not be created.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every slide failed; there is nothing to merge.
    #[error("All {total} slides failed to render.\nFirst error: {first_error}")]
    AllSlidesFailed { total: usize, first_error: String },

    /// The per-slide PDFs could not be merged.
    #[error("Failed to merge slide PDFs into '{path}': {detail}")]
    MergeFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A user-supplied icon catalog could not be loaded.
    #[error("Failed to load icon catalog '{path}': {detail}")]
    IconCatalog { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A slide id whose source document could not be found.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[error("Slide '{id}': source document unavailable at '{}': {reason}", path.display())]
pub struct ResolutionError {
    pub id: String,
    pub path: PathBuf,
    pub reason: String,
}

/// A single failed render attempt.
#[derive(Debug, Error)]
pub enum RenderAttemptError {
    /// The engine process could not be started.
    #[error("failed to launch rendering engine: {0}")]
    Launch(String),

    /// Navigation to the document failed.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The document did not finish its initial parse in time.
    #[error("document load timed out after {secs}s")]
    LoadTimeout { secs: u64 },

    /// Content height could not be measured.
    #[error("content measurement failed: {0}")]
    Measure(String),

    /// The engine failed to produce the page.
    #[error("print to PDF failed: {0}")]
    Print(String),

    /// The attempt as a whole exceeded its deadline; the engine is assumed hung.
    #[error("render attempt exceeded {secs}s and was abandoned")]
    Hung { secs: u64 },

    /// Writing the page to disk failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A non-fatal error for a single slide.
///
/// Stored alongside [`crate::output::RenderResult`] when a slide fails.
/// The overall run continues unless ALL slides fail.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum SlideError {
    /// Every render attempt failed.
    #[error("Slide '{id}': rendering failed after {attempts} attempts: {detail}")]
    RenderExhausted {
        id: String,
        attempts: u32,
        detail: String,
    },

    /// The document could not be rewritten or staged for rendering.
    #[error("Slide '{id}': document preparation failed: {detail}")]
    Transform { id: String, detail: String },
}

impl SlideError {
    /// Number of render attempts consumed before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            SlideError::RenderExhausted { attempts, .. } => *attempts,
            SlideError::Transform { .. } => 0,
        }
    }
}

/// Failure of the merge step itself.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// No slide produced a page.
    #[error("no slide rendered successfully ({total} attempted)")]
    NoSuccessfulSlides { total: usize },

    /// The PDF merger rejected the inputs or could not write the output.
    #[error("merge failed: {0}")]
    Merge(String),
}

/// Failure of the external presentation converter.
///
/// Fatal to the PPTX step only; the merged PDF is still reported.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ConversionError {
    /// The converter binary is not installed or not on `PATH`.
    #[error("document converter '{program}' not found")]
    NotFound { program: String },

    /// The converter could not be spawned.
    #[error("failed to run document converter: {0}")]
    Spawn(String),

    /// The converter did not finish in time and was killed.
    #[error("document converter timed out after {secs}s")]
    TimedOut { secs: u64 },

    /// The converter ran but exited unsuccessfully.
    #[error("document converter failed (exit {exit_code:?}): {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The converter reported success but the expected file is absent.
    #[error("document converter produced no output at '{}'", path.display())]
    MissingOutput { path: PathBuf },
}
