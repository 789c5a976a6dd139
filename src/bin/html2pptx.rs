//! CLI binary for html2pptx.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `DeckConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use html2pptx::{
    convert, inspect, ConversionOutput, ConversionProgressCallback, DeckConfig, DeckError,
    ProgressCallback, RunStatus,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Exit status when every slide failed.
const EXIT_TOTAL_FAILURE: i32 = 2;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per slide.
/// Slides finish out of order, so timings are keyed by id.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading descriptor…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} slides  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Rendering");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, id: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(id))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_slides: usize) {
        self.activate_bar(total_slides);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Rendering {total_slides} slides…"))
        ));
    }

    fn on_slide_start(&self, id: &str, _index: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(id.to_string(), Instant::now());
        }
        self.bar.set_message(id.to_string());
    }

    fn on_slide_retry(&self, id: &str, attempt: u32, max_attempts: u32, error: &str) {
        self.bar.println(format!(
            "  {} {:<24} attempt {}/{} failed: {}",
            yellow("↻"),
            id,
            attempt,
            max_attempts,
            dim(&truncate(error, 70)),
        ));
    }

    fn on_slide_complete(&self, id: &str, index: usize, total: usize, page_height: u32) {
        let secs = self.elapsed_secs(id);
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {:<24} {}  {}",
            green("✓"),
            index + 1,
            total,
            id,
            dim(&format!("{page_height:>5}px")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_slide_error(&self, id: &str, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(id);
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {:<24} {}  {}",
            red("✗"),
            index + 1,
            total,
            id,
            red(&truncate(error, 80)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, _total_slides: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let cut: String = s.chars().take(max_chars - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a deck (writes output/presentation.pdf and .pptx)
  html2pptx slides/deck.json

  # 1080p slides, two browsers at a time
  html2pptx --width 1920 --height 1080 --concurrency 2 slides/deck.json

  # Merged PDF only, keep per-slide files for debugging
  html2pptx --pdf-only --keep-intermediates -o build slides/deck.json

  # Check which slides resolve without rendering
  html2pptx --inspect-only slides/deck.json

DESCRIPTOR FORMAT:
  { "slide_ids": ["intro", "agenda"],
    "files": [ { "name": "agenda.html", "path": "sections/agenda.html" } ] }

  Each id resolves to a matching "files" entry, else <descriptor dir>/<id>.html.

ENVIRONMENT VARIABLES:
  HTML2PPTX_*       Every flag can be set this way (see --help output)
  CHROME_PATH       Chromium / Chrome executable
  PDFIUM_LIB_PATH   Path to libpdfium; otherwise the system library is used
  RUST_LOG          Overrides the log filter (e.g. html2pptx=debug)

EXIT STATUS:
  0  complete or partial success
  1  setup error (missing descriptor, no resolvable slides, bad output dir)
  2  total failure (no slide rendered)
"#;

/// Convert HTML slide decks to PDF and PowerPoint.
#[derive(Parser, Debug)]
#[command(
    name = "html2pptx",
    version,
    about = "Convert HTML slide decks to PDF and PowerPoint",
    long_about = "Render each HTML slide in headless Chromium at its true content height, \
merge the pages into one PDF in slide order, and convert the result to PPTX with LibreOffice.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Slide descriptor (JSON).
    descriptor: PathBuf,

    /// Viewport width in CSS pixels.
    #[arg(long, env = "HTML2PPTX_WIDTH", default_value_t = 1280)]
    width: u32,

    /// Viewport height in CSS pixels; taller slides get taller pages.
    #[arg(long, env = "HTML2PPTX_HEIGHT", default_value_t = 720)]
    height: u32,

    /// Maximum number of browsers running at once.
    #[arg(short, long, env = "HTML2PPTX_CONCURRENCY", default_value_t = 4,
          value_parser = clap::value_parser!(u64).range(1..=64))]
    concurrency: u64,

    /// Directory for the merged PDF and PPTX.
    #[arg(short = 'o', long, env = "HTML2PPTX_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// File stem of the merged outputs.
    #[arg(long, env = "HTML2PPTX_OUTPUT_NAME", default_value = "presentation")]
    output_name: String,

    /// Stop after the merged PDF; skip PowerPoint conversion.
    #[arg(long, env = "HTML2PPTX_PDF_ONLY")]
    pdf_only: bool,

    /// Keep per-slide PDFs and transformed HTML.
    #[arg(long, env = "HTML2PPTX_KEEP_INTERMEDIATES")]
    keep_intermediates: bool,

    /// Total render attempts per slide.
    #[arg(long, env = "HTML2PPTX_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Delay between attempts, in milliseconds.
    #[arg(long, env = "HTML2PPTX_RETRY_BACKOFF_MS", default_value_t = 2000)]
    retry_backoff_ms: u64,

    /// Per-attempt document load timeout, in seconds.
    #[arg(long, env = "HTML2PPTX_LOAD_TIMEOUT", default_value_t = 10)]
    load_timeout: u64,

    /// Pause after load for fonts and images, in milliseconds.
    #[arg(long, env = "HTML2PPTX_SETTLE_DELAY_MS", default_value_t = 1000)]
    settle_delay_ms: u64,

    /// CSS selector of the element whose height sets the page height.
    #[arg(long, env = "HTML2PPTX_SELECTOR", default_value = ".slide-container")]
    selector: String,

    /// Chromium executable.
    #[arg(long, env = "CHROME_PATH")]
    chrome: Option<PathBuf>,

    /// LibreOffice binary.
    #[arg(long, env = "HTML2PPTX_SOFFICE", default_value = "soffice")]
    soffice: PathBuf,

    /// Extra icon catalog (JSON) merged over the bundled one.
    #[arg(long, env = "HTML2PPTX_ICONS")]
    icons: Option<PathBuf>,

    /// Print the result as JSON (ConversionOutput) on stdout.
    #[arg(long, env = "HTML2PPTX_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "HTML2PPTX_NO_PROGRESS")]
    no_progress: bool,

    /// Resolve the descriptor and list slide sources; no rendering.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "HTML2PPTX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "HTML2PPTX_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar gives all the feedback that matters; keep library
    // logs to errors while it is on.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let report = inspect(&cli.descriptor)
            .await
            .context("Failed to inspect descriptor")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialize report")?
            );
        } else {
            println!("Descriptor:   {}", report.descriptor.display());
            println!("Slides:       {}", report.slides.len());
            for (i, slide) in report.slides.iter().enumerate() {
                match &slide.error {
                    None => println!("  {:>3}. {:<24} {}", i + 1, slide.id, slide.path.display()),
                    Some(e) => println!(
                        "  {:>3}. {:<24} {}  {}",
                        i + 1,
                        slide.id,
                        slide.path.display(),
                        red(&format!("({e})"))
                    ),
                }
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Run conversion ───────────────────────────────────────────────────
    let output = match convert(&cli.descriptor, &config).await {
        Ok(output) => output,
        Err(e @ DeckError::AllSlidesFailed { .. }) => {
            eprintln!("{} {}", red("✘"), bold("total failure"));
            eprintln!("{e}");
            std::process::exit(EXIT_TOTAL_FAILURE);
        }
        Err(e) => return Err(e).context("Conversion failed"),
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output);
    }

    Ok(())
}

/// Human-readable end-of-run report on stderr.
fn print_summary(output: &ConversionOutput) {
    let stats = &output.stats;
    match output.status {
        RunStatus::Complete => eprintln!("{} {}", green("✔"), bold(&output.status.to_string())),
        RunStatus::Partial { .. } => eprintln!("{} {}", yellow("⚠"), bold(&output.status.to_string())),
    }

    for slide in &output.omitted {
        eprintln!(
            "   {} {} (slide {}, {} attempts): {}",
            red("omitted"),
            slide.id,
            slide.sequence_index + 1,
            slide.attempts,
            slide.reason
        );
    }
    for unresolved in &output.unresolved {
        eprintln!("   {} {}", yellow("unresolved"), unresolved);
    }

    eprintln!("   PDF   {}", bold(&output.merged_pdf.display().to_string()));
    match (&output.pptx, &output.conversion_error) {
        (Some(pptx), _) => eprintln!("   PPTX  {}", bold(&pptx.display().to_string())),
        (None, Some(e)) => eprintln!("   PPTX  {}", red(&format!("not written: {e}"))),
        (None, None) => {}
    }
    eprintln!(
        "   {}",
        dim(&format!(
            "{}/{} slides, {} icons inlined, {}ms total",
            stats.rendered_slides,
            stats.requested_slides,
            stats.glyphs_replaced,
            stats.total_duration_ms
        ))
    );
}

/// Map CLI args to `DeckConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<DeckConfig> {
    let mut builder = DeckConfig::builder()
        .viewport(cli.width, cli.height)
        .concurrency(cli.concurrency as usize)
        .output_dir(&cli.output_dir)
        .output_name(&cli.output_name)
        .pdf_only(cli.pdf_only)
        .keep_intermediates(cli.keep_intermediates)
        .max_retries(cli.max_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .load_timeout_secs(cli.load_timeout)
        .settle_delay_ms(cli.settle_delay_ms)
        .content_selector(&cli.selector)
        .soffice_path(&cli.soffice);

    if let Some(ref chrome) = cli.chrome {
        builder = builder.chrome_executable(chrome);
    }
    if let Some(ref icons) = cli.icons {
        builder = builder.icon_catalog(icons);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
