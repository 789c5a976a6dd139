//! # html2pptx
//!
//! Convert a deck of standalone HTML slides into one PDF and an editable
//! PowerPoint file.
//!
//! ## Why this crate?
//!
//! HTML slides look right in a browser but come out wrong through naive
//! print paths: icon fonts vanish, tall slides clip or spill onto a second
//! page, and backgrounds drop. This crate rewrites each slide for print
//! (inline-SVG icons, print-safety CSS), prints every slide in headless
//! Chromium at exactly its content height, merges the pages in order and
//! hands the result to LibreOffice.
//!
//! ## Pipeline Overview
//!
//! ```text
//! descriptor.json
//!  │
//!  ├─ 1. Input      resolve slide ids to HTML files, in order
//!  ├─ 2. Transform  icon glyphs → inline SVG, print-safety CSS
//!  ├─ 3. Render     one Chromium per slide, height-corrected, with retries
//!  ├─ 4. Schedule   at most N browsers alive at once
//!  ├─ 5. Assemble   merge surviving pages via pdfium
//!  └─ 6. Office     merged PDF → PPTX via soffice
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use html2pptx::{convert, DeckConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DeckConfig::builder().output_dir("out").build()?;
//!     let output = convert("slides/deck.json", &config).await?;
//!     println!("{}: {}", output.status, output.merged_pdf.display());
//!     if let Some(pptx) = &output.pptx {
//!         println!("presentation: {}", pptx.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `html2pptx` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! html2pptx = { version = "0.3", default-features = false }
//! ```
//!
//! ## Runtime Requirements
//!
//! | Program | Used for | Override |
//! |---------|----------|----------|
//! | Chromium / Chrome | printing slides | `DeckConfig::chrome_executable` |
//! | libpdfium | merging pages | `PDFIUM_LIB_PATH` |
//! | LibreOffice `soffice` | PPTX conversion | `DeckConfig::soffice_path` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{DeckConfig, DeckConfigBuilder};
pub use convert::{convert, convert_sync, convert_with, inspect, Collaborators};
pub use error::{
    AssemblyError, ConversionError, DeckError, RenderAttemptError, ResolutionError, SlideError,
};
pub use output::{
    ConversionOutput, ConversionStats, Job, OmittedSlide, PageGeometry, RenderOutcome,
    RenderResult, RunStatus,
};
pub use pipeline::input::DeckInspection;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
