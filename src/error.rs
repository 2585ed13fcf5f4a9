//! Error taxonomy for export jobs
//!
//! Every variant is terminal for the current job attempt. Nothing in this crate
//! retries internally; the scheduler that submitted the job decides whether to
//! resubmit it.

use thiserror::Error;

/// Convenience alias for Result with `ExportError`
pub type ExportResult<T> = Result<T, ExportError>;

/// Errors surfaced by the export pipeline
#[derive(Debug, Error)]
pub enum ExportError {
    /// The browser process could not be started (or the pool is shut down)
    #[error("Failed to launch browser driver: {0}")]
    DriverLaunchFailure(String),

    /// Readiness selector did not appear within the bounded wait
    #[error("Timed out after {timeout_secs}s waiting for `{selector}` on {url}")]
    RenderTimeout {
        url: String,
        selector: String,
        timeout_secs: u64,
    },

    /// The browser failed to navigate to the render URL
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// A browser command (viewport resize, page creation) failed
    #[error("Browser command failed: {0}")]
    BrowserCommand(String),

    /// Evaluating a script in the page failed or returned an unusable value
    #[error("Script evaluation failed: {0}")]
    ScriptEvaluationFailure(String),

    /// Writing or reading the captured artifact failed
    #[error("Capture I/O failure: {0}")]
    CaptureIoFailure(String),

    /// The job names a target kind that cannot be rendered
    #[error("Export of type `{0}` not supported")]
    UnsupportedExportType(String),

    /// The export format has no capture strategy
    #[error("Export format `{0}` has no capture strategy")]
    UnsupportedExportFormat(String),

    /// Token failed validation
    #[error("Invalid export token: {0}")]
    InvalidToken(String),

    /// Whole job exceeded its time budget
    #[error("Export job exceeded {0}s")]
    JobTimeout(u64),

    /// The durable record referenced by the job does not exist
    #[error("Exported asset {0} not found")]
    AssetNotFound(i64),

    /// The durable record collaborator failed
    #[error("Asset storage error: {0}")]
    Storage(String),
}

impl ExportError {
    /// Stable label used in structured log fields
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DriverLaunchFailure(_) => "driver_launch_failure",
            Self::RenderTimeout { .. } => "render_timeout",
            Self::Navigation { .. } => "navigation",
            Self::BrowserCommand(_) => "browser_command",
            Self::ScriptEvaluationFailure(_) => "script_evaluation_failure",
            Self::CaptureIoFailure(_) => "capture_io_failure",
            Self::UnsupportedExportType(_) => "unsupported_export_type",
            Self::UnsupportedExportFormat(_) => "unsupported_export_format",
            Self::InvalidToken(_) => "invalid_token",
            Self::JobTimeout(_) => "job_timeout",
            Self::AssetNotFound(_) => "asset_not_found",
            Self::Storage(_) => "storage",
        }
    }

    /// Whether the failure happened before any browser interaction
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedExportType(_)
                | Self::UnsupportedExportFormat(_)
                | Self::InvalidToken(_)
                | Self::AssetNotFound(_)
        )
    }
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        Self::CaptureIoFailure(err.to_string())
    }
}

impl From<sqlx::Error> for ExportError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
