//! Headless rendering engine: the seam between the pipeline and Chromium.
//!
//! The renderer only needs five things from a browser: load a local file,
//! measure an element, resize the viewport, print one page, and shut down.
//! [`RenderEngine`] / [`EngineSession`] name exactly those, so the retry and
//! scheduling logic is tested against in-memory fakes and the Chromium
//! implementation stays a thin adapter.
//!
//! ## One process per attempt
//!
//! Every [`RenderEngine::launch`] starts a fresh browser with its own
//! throwaway profile. A crashed or wedged instance therefore cannot poison
//! the next attempt or a sibling slide, and [`EngineSession::close`] tears
//! down the whole process tree.

use crate::error::RenderAttemptError;
use crate::output::PageGeometry;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{NavigateParams, PrintToPdfParams};
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

/// Browser window size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Starts isolated engine sessions.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Start a new engine instance sized to `viewport`.
    async fn launch(&self, viewport: Viewport) -> Result<Box<dyn EngineSession>, RenderAttemptError>;
}

/// One live engine instance holding a single page.
#[async_trait]
pub trait EngineSession: Send {
    /// Navigate to `document` and wait for its initial parse, up to `timeout`.
    async fn load(&mut self, document: &Path, timeout: Duration) -> Result<(), RenderAttemptError>;

    /// Rendered height in CSS px of the first element matching `selector`,
    /// or of the document body when nothing matches.
    async fn content_height(&mut self, selector: &str) -> Result<u32, RenderAttemptError>;

    async fn set_viewport(&mut self, viewport: Viewport) -> Result<(), RenderAttemptError>;

    /// Print exactly one page of `geometry`'s size to `output`.
    async fn print_pdf(&mut self, geometry: &PageGeometry, output: &Path) -> Result<(), RenderAttemptError>;

    /// Shut the instance down. Must not fail; errors are logged.
    async fn close(self: Box<Self>);
}

/// How often `document.readyState` is polled while loading.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Launch flags applied to every instance.
const CHROME_ARGS: &[&str] = &[
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--hide-scrollbars",
    "--font-render-hinting=none",
    "--allow-file-access-from-files",
    "--no-first-run",
];

/// [`RenderEngine`] backed by a local headless Chromium via the DevTools
/// protocol.
#[derive(Debug, Clone, Default)]
pub struct ChromiumEngine {
    executable: Option<PathBuf>,
}

impl ChromiumEngine {
    /// Use `executable` when given, else let chromiumoxide search the usual
    /// install locations.
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    async fn launch(&self, viewport: Viewport) -> Result<Box<dyn EngineSession>, RenderAttemptError> {
        let profile = tempfile::Builder::new().prefix("html2pptx-chrome-").tempdir()?;

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(viewport.width, viewport.height)
            .user_data_dir(profile.path());
        for arg in CHROME_ARGS {
            builder = builder.arg(*arg);
        }
        if let Some(exe) = &self.executable {
            builder = builder.chrome_executable(exe);
        }
        let config = builder.build().map_err(RenderAttemptError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderAttemptError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(drain_events(handler));

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                shutdown(browser, handler_task).await;
                return Err(RenderAttemptError::Launch(format!("failed to open page: {e}")));
            }
        };

        let mut session = ChromiumSession {
            browser,
            page,
            handler_task,
            _profile: profile,
        };
        if let Err(e) = session.set_viewport(viewport).await {
            Box::new(session).close().await;
            return Err(e);
        }
        debug!(width = viewport.width, height = viewport.height, "Chromium session ready");
        Ok(Box::new(session))
    }
}

struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    // Removed on drop, after the browser has exited.
    _profile: tempfile::TempDir,
}

#[async_trait]
impl EngineSession for ChromiumSession {
    async fn load(&mut self, document: &Path, limit: Duration) -> Result<(), RenderAttemptError> {
        let url = file_url(document)?;
        let started = Instant::now();

        let navigate = async {
            let response = self
                .page
                .execute(NavigateParams::new(url.clone()))
                .await
                .map_err(|e| RenderAttemptError::Navigation(e.to_string()))?;
            if let Some(error_text) = &response.result.error_text {
                return Err(RenderAttemptError::Navigation(format!("{url}: {error_text}")));
            }
            // Structural parse is done once the document leaves "loading".
            loop {
                let state: String = self
                    .page
                    .evaluate("document.readyState")
                    .await
                    .map_err(|e| RenderAttemptError::Navigation(e.to_string()))?
                    .into_value()
                    .map_err(|e| RenderAttemptError::Navigation(e.to_string()))?;
                if state != "loading" {
                    return Ok(());
                }
                sleep(READY_POLL_INTERVAL).await;
            }
        };

        match timeout(limit, navigate).await {
            Ok(result) => {
                debug!(url = %url, elapsed_ms = started.elapsed().as_millis() as u64, "Document parsed");
                result
            }
            Err(_) => Err(RenderAttemptError::LoadTimeout {
                secs: limit.as_secs(),
            }),
        }
    }

    async fn content_height(&mut self, selector: &str) -> Result<u32, RenderAttemptError> {
        let script = measure_script(selector)
            .map_err(|e| RenderAttemptError::Measure(format!("bad selector: {e}")))?;
        let height: f64 = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| RenderAttemptError::Measure(e.to_string()))?
            .into_value()
            .map_err(|e| RenderAttemptError::Measure(e.to_string()))?;
        if !height.is_finite() || height < 0.0 {
            return Err(RenderAttemptError::Measure(format!("implausible height {height}")));
        }
        Ok(height.ceil() as u32)
    }

    async fn set_viewport(&mut self, viewport: Viewport) -> Result<(), RenderAttemptError> {
        self.page
            .execute(SetDeviceMetricsOverrideParams::new(
                viewport.width as i64,
                viewport.height as i64,
                1.0,
                false,
            ))
            .await
            .map_err(|e| RenderAttemptError::Navigation(format!("viewport override failed: {e}")))?;
        Ok(())
    }

    async fn print_pdf(&mut self, geometry: &PageGeometry, output: &Path) -> Result<(), RenderAttemptError> {
        let params = PrintToPdfParams {
            landscape: Some(false),
            print_background: Some(true),
            scale: Some(1.0),
            paper_width: Some(geometry.paper_width_in()),
            paper_height: Some(geometry.paper_height_in()),
            margin_top: Some(0.0),
            margin_bottom: Some(0.0),
            margin_left: Some(0.0),
            margin_right: Some(0.0),
            page_ranges: Some("1".to_string()),
            prefer_css_page_size: Some(false),
            ..Default::default()
        };
        let bytes = self
            .page
            .pdf(params)
            .await
            .map_err(|e| RenderAttemptError::Print(e.to_string()))?;
        if bytes.is_empty() {
            return Err(RenderAttemptError::Print("engine returned an empty document".into()));
        }
        tokio::fs::write(output, bytes).await?;
        Ok(())
    }

    async fn close(self: Box<Self>) {
        let ChromiumSession {
            browser,
            page,
            handler_task,
            _profile,
        } = *self;
        if let Err(e) = page.close().await {
            debug!("Page close failed: {e}");
        }
        shutdown(browser, handler_task).await;
    }
}

/// Drive the CDP connection until it closes. Individual handler errors
/// (unparseable messages from a newer browser, say) are not fatal; stopping
/// early would leave every later page command without a reply.
async fn drain_events<S, E>(mut events: S)
where
    S: futures::Stream<Item = Result<(), E>> + Unpin,
    E: std::fmt::Display,
{
    while let Some(event) = events.next().await {
        if let Err(e) = event {
            debug!("Chromium event handler error: {e}");
        }
    }
}

/// Close the browser, falling back to killing it, then stop the event loop.
async fn shutdown(mut browser: Browser, handler_task: JoinHandle<()>) {
    if let Err(e) = browser.close().await {
        warn!("Chromium did not close cleanly, killing it: {e}");
        if let Some(Err(e)) = browser.kill().await {
            warn!("Failed to kill Chromium: {e}");
        }
    }
    if let Err(e) = browser.wait().await {
        debug!("Waiting for Chromium exit failed: {e}");
    }
    handler_task.abort();
}

/// JavaScript measuring the content element, with the body as fallback.
fn measure_script(selector: &str) -> Result<String, serde_json::Error> {
    let selector = serde_json::to_string(selector)?;
    Ok(format!(
        "(() => {{\
           let el = null;\
           try {{ el = document.querySelector({selector}); }} catch (_) {{}}\
           el = el || document.body || document.documentElement;\
           if (!el) return 0;\
           const rect = el.getBoundingClientRect();\
           return Math.max(el.scrollHeight, rect.bottom + window.scrollY);\
         }})()"
    ))
}

/// `file://` URL for a local path, percent-encoding anything outside the
/// unreserved set.
pub(crate) fn file_url(path: &Path) -> std::io::Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let raw = absolute.to_string_lossy().replace('\\', "/");
    let mut url = String::with_capacity(raw.len() + 8);
    url.push_str("file://");
    if !raw.starts_with('/') {
        url.push('/');
    }
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' | b':' => {
                url.push(byte as char)
            }
            other => url.push_str(&format!("%{other:02X}")),
        }
    }
    Ok(url)
}
