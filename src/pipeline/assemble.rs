//! Merge per-slide PDFs into one deck, in slide order.
//!
//! Failed slides are skipped and reported, never padded with blank pages,
//! so the deck's page count always equals the number of successes.
//!
//! Merging goes through pdfium, which is blocking and not async-safe, so the
//! work runs on tokio's blocking pool.

use crate::error::AssemblyError;
use crate::output::{OmittedSlide, RenderOutcome, RenderResult, RunStatus};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Concatenates single-page documents into one.
#[async_trait]
pub trait PageMerger: Send + Sync {
    /// Write `pages`, in the given order, to `output`.
    async fn merge(&self, pages: &[PathBuf], output: &Path) -> Result<(), AssemblyError>;
}

/// The merged document and which slides it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedArtifact {
    pub path: PathBuf,
    /// Slide ids, one per page.
    pub page_sources: Vec<String>,
}

/// Outcome of the assembly step.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub artifact: MergedArtifact,
    pub omitted: Vec<OmittedSlide>,
    pub status: RunStatus,
}

/// Merge the successful results into `output`, in `sequence_index` order.
///
/// Returns [`AssemblyError::NoSuccessfulSlides`] when nothing succeeded.
pub async fn assemble(
    results: &[RenderResult],
    output: &Path,
    merger: &dyn PageMerger,
) -> Result<Assembly, AssemblyError> {
    let mut ordered: Vec<&RenderResult> = results.iter().collect();
    ordered.sort_by_key(|r| r.sequence_index);

    let mut pages = Vec::new();
    let mut page_sources = Vec::new();
    let mut omitted = Vec::new();
    for result in ordered {
        match &result.outcome {
            RenderOutcome::Success { artifact_path, .. } => {
                pages.push(artifact_path.clone());
                page_sources.push(result.id.clone());
            }
            RenderOutcome::Failure { reason, attempts } => {
                warn!(slide = %result.id, index = result.sequence_index, "Omitting slide from deck");
                omitted.push(OmittedSlide {
                    id: result.id.clone(),
                    sequence_index: result.sequence_index,
                    reason: reason.to_string(),
                    attempts: *attempts,
                });
            }
        }
    }

    if pages.is_empty() {
        return Err(AssemblyError::NoSuccessfulSlides {
            total: results.len(),
        });
    }

    merger.merge(&pages, output).await?;
    info!(
        pages = pages.len(),
        omitted = omitted.len(),
        path = %output.display(),
        "Merged deck written"
    );

    Ok(Assembly {
        status: RunStatus::from_counts(pages.len(), results.len()),
        artifact: MergedArtifact {
            path: output.to_path_buf(),
            page_sources,
        },
        omitted,
    })
}

/// [`PageMerger`] backed by pdfium.
///
/// Binds to the library at `PDFIUM_LIB_PATH` when set, otherwise to the
/// system library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumMerger {
    library_path: Option<PathBuf>,
}

impl PdfiumMerger {
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from))
    }
}

#[async_trait]
impl PageMerger for PdfiumMerger {
    async fn merge(&self, pages: &[PathBuf], output: &Path) -> Result<(), AssemblyError> {
        let pages = pages.to_vec();
        let output = output.to_path_buf();
        let library = self.library_path.clone();

        tokio::task::spawn_blocking(move || merge_blocking(library.as_deref(), &pages, &output))
            .await
            .map_err(|e| AssemblyError::Merge(format!("merge task panicked: {e}")))?
    }
}

fn merge_blocking(library: Option<&Path>, pages: &[PathBuf], output: &Path) -> Result<(), AssemblyError> {
    let bindings = match library {
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| AssemblyError::Merge(format!("failed to bind to pdfium: {e:?}")))?;
    let pdfium = Pdfium::new(bindings);

    let mut merged = pdfium
        .create_new_pdf()
        .map_err(|e| AssemblyError::Merge(format!("failed to create document: {e:?}")))?;

    for page in pages {
        let doc = pdfium.load_pdf_from_file(page, None).map_err(|e| {
            AssemblyError::Merge(format!("failed to open '{}': {e:?}", page.display()))
        })?;
        merged.pages_mut().append(&doc).map_err(|e| {
            AssemblyError::Merge(format!("failed to append '{}': {e:?}", page.display()))
        })?;
        debug!(page = %page.display(), "Appended slide page");
    }

    merged
        .save_to_file(output)
        .map_err(|e| AssemblyError::Merge(format!("failed to write '{}': {e:?}", output.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SlideError;
    use std::sync::Mutex;

    /// Records the merge order instead of touching pdfium.
    #[derive(Default)]
    struct RecordingMerger {
        calls: Mutex<Vec<Vec<PathBuf>>>,
    }

    #[async_trait]
    impl PageMerger for RecordingMerger {
        async fn merge(&self, pages: &[PathBuf], _output: &Path) -> Result<(), AssemblyError> {
            self.calls.lock().unwrap().push(pages.to_vec());
            Ok(())
        }
    }

    fn ok(i: usize) -> RenderResult {
        RenderResult {
            sequence_index: i,
            id: format!("s{i}"),
            outcome: RenderOutcome::Success {
                artifact_path: PathBuf::from(format!("{i}.pdf")),
                page_width: 1280,
                page_height: 720,
            },
            duration_ms: 1,
            glyphs_replaced: 0,
            glyphs_unresolved: 0,
        }
    }

    fn failed(i: usize) -> RenderResult {
        RenderResult {
            sequence_index: i,
            id: format!("s{i}"),
            outcome: RenderOutcome::Failure {
                reason: SlideError::RenderExhausted {
                    id: format!("s{i}"),
                    attempts: 3,
                    detail: "crash".into(),
                },
                attempts: 3,
            },
            duration_ms: 1,
            glyphs_replaced: 0,
            glyphs_unresolved: 0,
        }
    }

    #[tokio::test]
    async fn failed_slide_is_skipped_and_order_kept() {
        let merger = RecordingMerger::default();
        let results = vec![ok(0), ok(1), failed(2), ok(3), ok(4)];

        let assembly = assemble(&results, Path::new("deck.pdf"), &merger).await.unwrap();

        let calls = merger.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            vec![
                PathBuf::from("0.pdf"),
                PathBuf::from("1.pdf"),
                PathBuf::from("3.pdf"),
                PathBuf::from("4.pdf"),
            ]
        );
        assert_eq!(assembly.artifact.page_sources, vec!["s0", "s1", "s3", "s4"]);
        assert_eq!(assembly.omitted.len(), 1);
        assert_eq!(assembly.omitted[0].id, "s2");
        assert_eq!(assembly.status.to_string(), "partial success (4 of 5 slides)");
    }

    #[tokio::test]
    async fn out_of_order_results_are_sorted() {
        let merger = RecordingMerger::default();
        let results = vec![ok(2), ok(0), ok(1)];

        let assembly = assemble(&results, Path::new("deck.pdf"), &merger).await.unwrap();

        assert_eq!(assembly.artifact.page_sources, vec!["s0", "s1", "s2"]);
        assert_eq!(assembly.status, RunStatus::Complete);
    }

    #[tokio::test]
    async fn all_failed_is_an_error_and_merger_is_not_called() {
        let merger = RecordingMerger::default();
        let results = vec![failed(0), failed(1)];

        let err = assemble(&results, Path::new("deck.pdf"), &merger).await.unwrap_err();

        assert!(matches!(err, AssemblyError::NoSuccessfulSlides { total: 2 }));
        assert!(merger.calls.lock().unwrap().is_empty());
    }
}
