//! Input resolution: turn a slide descriptor into an ordered list of jobs.
//!
//! The descriptor names slides by id and, optionally, where each one lives:
//!
//! ```json
//! { "slide_ids": ["intro", "agenda"],
//!   "files": [ { "name": "agenda.html", "path": "decks/agenda.html" } ] }
//! ```
//!
//! An id resolves to the `path` of a file record named `<id>` or
//! `<id>.html`, else to `<descriptor dir>/<id>.html`. Relative paths are
//! taken from the descriptor's directory. Ids whose document cannot be read
//! are reported and dropped; the rest keep their relative order.

use crate::error::{DeckError, ResolutionError};
use crate::output::Job;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Parsed slide descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlideDescriptor {
    /// Slide ids in presentation order.
    pub slide_ids: Vec<String>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
}

/// A known source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Jobs ready to render plus the ids that did not resolve.
#[derive(Debug, Clone)]
pub struct ResolvedDeck {
    pub jobs: Vec<Job>,
    pub unresolved: Vec<ResolutionError>,
    /// Number of ids in the descriptor.
    pub requested: usize,
}

/// Per-slide resolution report, without document contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckInspection {
    pub descriptor: PathBuf,
    pub slides: Vec<SlideSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlideSource {
    pub id: String,
    pub path: PathBuf,
    /// `None` when the document is readable.
    pub error: Option<String>,
}

/// Read and parse the descriptor at `path`.
pub async fn load_descriptor(path: &Path) -> Result<SlideDescriptor, DeckError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DeckError::DescriptorNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(DeckError::DescriptorInvalid {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })
        }
    };
    let descriptor: SlideDescriptor =
        serde_json::from_str(&raw).map_err(|e| DeckError::DescriptorInvalid {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    debug!(
        path = %path.display(),
        slides = descriptor.slide_ids.len(),
        files = descriptor.files.len(),
        "Descriptor parsed"
    );
    Ok(descriptor)
}

/// Directory that relative descriptor paths resolve against.
pub fn descriptor_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Where the document for `id` is expected to live.
pub fn source_path_for(descriptor: &SlideDescriptor, base_dir: &Path, id: &str) -> PathBuf {
    let with_ext = format!("{id}.html");
    let record = descriptor
        .files
        .iter()
        .find(|f| f.name == id || f.name == with_ext);

    match record {
        Some(FileRecord {
            path: Some(path), ..
        }) => base_dir.join(path),
        Some(FileRecord { name, path: None }) => base_dir.join(name),
        None => base_dir.join(with_ext),
    }
}

/// Read every slide's document, assigning dense sequence indices over the
/// ones that resolve.
pub async fn resolve_jobs(descriptor: &SlideDescriptor, base_dir: &Path) -> ResolvedDeck {
    let mut jobs = Vec::with_capacity(descriptor.slide_ids.len());
    let mut unresolved = Vec::new();

    for id in &descriptor.slide_ids {
        let path = source_path_for(descriptor, base_dir, id);
        match tokio::fs::read_to_string(&path).await {
            Ok(source_document) => {
                jobs.push(Job {
                    id: id.clone(),
                    source_path: path,
                    source_document,
                    sequence_index: jobs.len(),
                });
            }
            Err(e) => {
                warn!(slide = %id, path = %path.display(), "Slide source unavailable, skipping: {e}");
                unresolved.push(ResolutionError {
                    id: id.clone(),
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        requested = descriptor.slide_ids.len(),
        resolved = jobs.len(),
        unresolved = unresolved.len(),
        "Slides resolved"
    );
    ResolvedDeck {
        jobs,
        unresolved,
        requested: descriptor.slide_ids.len(),
    }
}

/// Load the descriptor at `path` and resolve its slides.
pub async fn resolve_deck(path: &Path) -> Result<ResolvedDeck, DeckError> {
    let descriptor = load_descriptor(path).await?;
    Ok(resolve_jobs(&descriptor, descriptor_dir(path)).await)
}

/// Report how each slide resolves without keeping document contents.
pub async fn inspect_deck(path: &Path) -> Result<DeckInspection, DeckError> {
    let descriptor = load_descriptor(path).await?;
    let base_dir = descriptor_dir(path);
    let mut slides = Vec::with_capacity(descriptor.slide_ids.len());
    for id in &descriptor.slide_ids {
        let source = source_path_for(&descriptor, base_dir, id);
        let error = match tokio::fs::metadata(&source).await {
            Ok(meta) if meta.is_file() => None,
            Ok(_) => Some("not a regular file".to_string()),
            Err(e) => Some(e.to_string()),
        };
        slides.push(SlideSource {
            id: id.clone(),
            path: source,
            error,
        });
    }
    Ok(DeckInspection {
        descriptor: path.to_path_buf(),
        slides,
    })
}
