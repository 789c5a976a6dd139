//! Progress-callback trait for per-slide conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::DeckConfigBuilder::progress_callback`] to receive events
//! as the scheduler starts, retries, and finishes each slide.
//!
//! Slides render concurrently, so events for different slides interleave
//! and may arrive on different threads. Implementations protect shared state
//! with `Mutex` or atomics.
//!
//! # Example
//!
//! ```rust
//! use html2pptx::{ConversionProgressCallback, DeckConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_slide_complete(&self, id: &str, _index: usize, total: usize, page_height: u32) {
//!         let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done}/{total}: {id} ({page_height}px)");
//!     }
//! }
//!
//! let config = DeckConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each slide.
///
/// All methods default to no-ops so callers only override what they need.
/// `index` is the slide's zero-based sequence index.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once, after the descriptor is resolved and before any slide
    /// is rendered.
    fn on_conversion_start(&self, total_slides: usize) {
        let _ = total_slides;
    }

    /// Called when a slide is admitted by the scheduler.
    fn on_slide_start(&self, id: &str, index: usize, total: usize) {
        let _ = (id, index, total);
    }

    /// Called after a failed attempt when another attempt will follow.
    fn on_slide_retry(&self, id: &str, attempt: u32, max_attempts: u32, error: &str) {
        let _ = (id, attempt, max_attempts, error);
    }

    /// Called when a slide's page has been written.
    fn on_slide_complete(&self, id: &str, index: usize, total: usize, page_height: u32) {
        let _ = (id, index, total, page_height);
    }

    /// Called when a slide has failed for good.
    fn on_slide_error(&self, id: &str, index: usize, total: usize, error: &str) {
        let _ = (id, index, total, error);
    }

    /// Called once after every slide has been attempted.
    fn on_conversion_complete(&self, total_slides: usize, success_count: usize) {
        let _ = (total_slides, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::DeckConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
