//! Core configuration types for the export worker

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Default readiness selector exposed by the export render page
pub const DEFAULT_READINESS_SELECTOR: &str = ".InsightCard";

/// Bounded wait for the readiness selector, in seconds
pub const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_READINESS_POLL_INTERVAL_MS: u64 = 100;

/// Upper bound for one whole export job, in seconds
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_DASHBOARD_VIEWPORT_WIDTH: u32 = 1920;
pub const DEFAULT_INSIGHT_VIEWPORT_WIDTH: u32 = 800;

/// Lifetime of signed render tokens, in seconds
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 300;

/// Main configuration struct for the export worker
#[derive(Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Base URL of the web app serving the export render page.
    ///
    /// **INVARIANT:** absolute http(s) URL (validated in builder).
    pub(crate) site_url: Url,

    /// Directory receiving temporary capture files
    pub(crate) scratch_dir: PathBuf,

    /// Number of browser sessions per process; each renders one job at a time
    pub(crate) pool_size: usize,

    /// Run browsers headless. Forced on in release builds.
    pub(crate) headless: bool,

    /// CSS selector whose presence marks the page as rendered
    pub(crate) readiness_selector: String,

    pub(crate) readiness_timeout_secs: u64,
    pub(crate) readiness_poll_interval_ms: u64,
    pub(crate) job_timeout_secs: u64,

    pub(crate) dashboard_viewport_width: u32,
    pub(crate) insight_viewport_width: u32,

    /// Signing key for render tokens. `None` falls back to unsigned tokens.
    #[serde(skip_serializing)]
    pub(crate) token_secret: Option<String>,
    pub(crate) token_ttl_secs: u64,
}

impl std::fmt::Debug for ExporterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExporterConfig")
            .field("site_url", &self.site_url.as_str())
            .field("scratch_dir", &self.scratch_dir)
            .field("pool_size", &self.pool_size)
            .field("headless", &self.headless)
            .field("readiness_selector", &self.readiness_selector)
            .field("readiness_timeout_secs", &self.readiness_timeout_secs)
            .field("job_timeout_secs", &self.job_timeout_secs)
            .field("token_secret", &self.token_secret.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}
