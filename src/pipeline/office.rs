//! Final-format conversion: merged PDF to an editable presentation.
//!
//! Delegated to LibreOffice's headless `soffice`, importing the PDF through
//! the Impress filter so each page becomes one slide. The converter runs with
//! a throwaway user profile so it never collides with a desktop instance.

use crate::error::ConversionError;
use crate::pipeline::engine::file_url;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Default wall-clock limit for one conversion.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Converts a merged PDF into a presentation file.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Convert `merged_pdf`; returns the path of the written presentation.
    async fn convert(&self, merged_pdf: &Path) -> Result<PathBuf, ConversionError>;
}

/// [`DocumentConverter`] that shells out to LibreOffice.
#[derive(Debug, Clone)]
pub struct SofficeConverter {
    program: PathBuf,
    timeout: Duration,
}

impl SofficeConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DocumentConverter for SofficeConverter {
    async fn convert(&self, merged_pdf: &Path) -> Result<PathBuf, ConversionError> {
        let started_at = Instant::now();
        let outdir = merged_pdf
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let expected = merged_pdf.with_extension("pptx");

        // A deck left by an earlier run must not pass for this run's output.
        match tokio::fs::remove_file(&expected).await {
            Ok(()) => debug!(path = %expected.display(), "Removed stale presentation"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ConversionError::Spawn(format!(
                    "cannot replace {}: {e}",
                    expected.display()
                )))
            }
        }

        let profile = tempfile::Builder::new()
            .prefix("html2pptx-soffice-")
            .tempdir()
            .map_err(|e| ConversionError::Spawn(format!("cannot create profile dir: {e}")))?;
        let profile_url = file_url(profile.path())
            .map_err(|e| ConversionError::Spawn(format!("cannot resolve profile dir: {e}")))?;

        let child = Command::new(&self.program)
            .arg(format!("-env:UserInstallation={profile_url}"))
            .arg("--headless")
            .arg("--infilter=impress_pdf_import")
            .arg("--convert-to")
            .arg("pptx")
            .arg("--outdir")
            .arg(outdir)
            .arg(merged_pdf)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                warn!(
                    op = "soffice::convert",
                    result = "error",
                    error_code = "spawn",
                    program = %self.program.display(),
                    error = %err,
                    "Failed to spawn document converter"
                );
                if err.kind() == ErrorKind::NotFound {
                    ConversionError::NotFound {
                        program: self.program.display().to_string(),
                    }
                } else {
                    ConversionError::Spawn(err.to_string())
                }
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return Err(ConversionError::Spawn(err.to_string())),
            Err(_) => {
                warn!(
                    op = "soffice::convert",
                    result = "error",
                    error_code = "timeout",
                    timeout_secs = self.timeout.as_secs(),
                    "Document converter timed out"
                );
                return Err(ConversionError::TimedOut {
                    secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let exit_code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(
                op = "soffice::convert",
                result = "error",
                error_code = "exit_status",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                stderr = %stderr,
                "Document converter failed"
            );
            return Err(ConversionError::Failed { exit_code, stderr });
        }

        // soffice exits 0 even when the import filter rejects the input.
        if !expected.exists() {
            warn!(
                op = "soffice::convert",
                result = "error",
                error_code = "missing_output",
                stdout = %String::from_utf8_lossy(&output.stdout),
                "Document converter produced no file"
            );
            return Err(ConversionError::MissingOutput { path: expected });
        }

        info!(
            op = "soffice::convert",
            result = "ok",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            path = %expected.display(),
            "Presentation written"
        );
        Ok(expected)
    }
}
