//! The render-capture procedure
//!
//! Drives one session through: bootstrap viewport, navigate, wait for the
//! readiness selector, measure content height, resize, capture to the scratch
//! path, read it back. The scratch file is removed on every exit path.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::session::RenderSession;
use super::{CaptureResult, RenderTarget};
use crate::asset::ExportFormat;
use crate::error::{ExportError, ExportResult};
use crate::scratch::ScratchFile;

/// Script returning the full scrollable height of the document
pub const CONTENT_HEIGHT_SCRIPT: &str = "document.body.scrollHeight";

/// Timing knobs for the readiness wait
#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    pub readiness_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            readiness_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// How the final artifact is produced from the sized page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStrategy {
    Screenshot,
    PrintPdf,
}

impl CaptureStrategy {
    /// Pick the strategy for `format`; CSV has none in the browser path
    pub fn for_format(format: ExportFormat) -> ExportResult<Self> {
        match format {
            ExportFormat::Png => Ok(Self::Screenshot),
            ExportFormat::Pdf => Ok(Self::PrintPdf),
            ExportFormat::Csv => Err(ExportError::UnsupportedExportFormat(
                format.mime().to_string(),
            )),
        }
    }
}

/// Run the capture procedure against `session`
///
/// Nothing here is retried. Whatever the browser wrote to `scratch_path` is
/// deleted before this returns, successfully or not.
pub async fn render_capture<S>(
    session: &S,
    target: &RenderTarget,
    format: ExportFormat,
    scratch_path: &Path,
    settings: CaptureSettings,
) -> ExportResult<CaptureResult>
where
    S: RenderSession + ?Sized,
{
    let strategy = CaptureStrategy::for_format(format)?;

    let scratch = ScratchFile::adopt(scratch_path);
    let width = target.viewport_width_initial;

    // Square bootstrap size; real height is unknown until the page renders
    session
        .set_viewport(width, width)
        .await
        .map_err(|e| ExportError::BrowserCommand(format!("{e:#}")))?;

    session
        .navigate(&target.url)
        .await
        .map_err(|e| ExportError::Navigation {
            url: target.url.clone(),
            message: format!("{e:#}"),
        })?;

    wait_for_selector(session, target, settings).await?;

    let height = measure_content_height(session).await?;
    debug!(width, height, "Resizing viewport to content");

    session
        .set_viewport(width, height)
        .await
        .map_err(|e| ExportError::BrowserCommand(format!("{e:#}")))?;

    let captured = match strategy {
        CaptureStrategy::Screenshot => session.save_screenshot(scratch.path()).await,
        CaptureStrategy::PrintPdf => session.save_pdf(scratch.path()).await,
    };
    captured.map_err(|e| ExportError::CaptureIoFailure(format!("{e:#}")))?;

    let bytes = tokio::fs::read(scratch.path()).await.map_err(|e| {
        ExportError::CaptureIoFailure(format!(
            "Failed to read capture {}: {e}",
            scratch.path().display()
        ))
    })?;
    scratch.remove();

    info!(
        url = %target.url,
        bytes = bytes.len(),
        content_type = format.mime(),
        "Capture complete"
    );

    Ok(CaptureResult {
        bytes,
        content_type: format.mime().to_string(),
    })
}

/// Poll for the readiness selector until it appears or the wait runs out
///
/// Selector presence is a best-effort signal: the page may still be settling
/// when the element first shows up.
async fn wait_for_selector<S>(
    session: &S,
    target: &RenderTarget,
    settings: CaptureSettings,
) -> ExportResult<()>
where
    S: RenderSession + ?Sized,
{
    let start = Instant::now();
    let poll = async {
        loop {
            // A lookup error means the page or browser is gone, not "not yet"
            if session.has_element(&target.readiness_selector).await? {
                return Ok::<(), anyhow::Error>(());
            }
            tokio::time::sleep(settings.poll_interval).await;
        }
    };

    match tokio::time::timeout(settings.readiness_timeout, poll).await {
        Ok(Err(e)) => Err(ExportError::BrowserCommand(format!(
            "readiness check for `{}` failed: {e:#}",
            target.readiness_selector
        ))),
        Ok(Ok(())) => {
            debug!(
                selector = %target.readiness_selector,
                "Readiness selector found after {:?}",
                start.elapsed()
            );
            Ok(())
        }
        Err(_) => Err(ExportError::RenderTimeout {
            url: target.url.clone(),
            selector: target.readiness_selector.clone(),
            timeout_secs: settings.readiness_timeout.as_secs(),
        }),
    }
}

async fn measure_content_height<S>(session: &S) -> ExportResult<u32>
where
    S: RenderSession + ?Sized,
{
    let value = session
        .evaluate(CONTENT_HEIGHT_SCRIPT)
        .await
        .map_err(|e| ExportError::ScriptEvaluationFailure(format!("{e:#}")))?;

    let height = value.as_f64().ok_or_else(|| {
        ExportError::ScriptEvaluationFailure(format!("content height is not a number: {value}"))
    })?;

    if !height.is_finite() || height < 1.0 || height > f64::from(u32::MAX) {
        return Err(ExportError::ScriptEvaluationFailure(format!(
            "content height out of range: {height}"
        )));
    }

    Ok(height.ceil() as u32)
}
