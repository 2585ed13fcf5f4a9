//! Type-safe builder for `ExporterConfig` using the typestate pattern
//!
//! `site_url` is the only required field; `build()` only exists once it has
//! been supplied.

use anyhow::{Result, anyhow, bail};
use std::marker::PhantomData;
use std::path::PathBuf;
use tracing::warn;
use url::Url;

use super::types::{
    DEFAULT_DASHBOARD_VIEWPORT_WIDTH, DEFAULT_INSIGHT_VIEWPORT_WIDTH, DEFAULT_JOB_TIMEOUT_SECS,
    DEFAULT_READINESS_POLL_INTERVAL_MS, DEFAULT_READINESS_SELECTOR,
    DEFAULT_READINESS_TIMEOUT_SECS, DEFAULT_TOKEN_TTL_SECS, ExporterConfig,
};

// Type states for the builder
pub struct WithSiteUrl;

pub struct ExporterConfigBuilder<State = ()> {
    site_url: Option<Url>,
    scratch_dir: Option<PathBuf>,
    pool_size: usize,
    headless: bool,
    readiness_selector: String,
    readiness_timeout_secs: u64,
    readiness_poll_interval_ms: u64,
    job_timeout_secs: u64,
    dashboard_viewport_width: u32,
    insight_viewport_width: u32,
    token_secret: Option<String>,
    token_ttl_secs: u64,
    _phantom: PhantomData<State>,
}

impl Default for ExporterConfigBuilder<()> {
    fn default() -> Self {
        Self {
            site_url: None,
            scratch_dir: None,
            pool_size: 1,
            headless: true,
            readiness_selector: DEFAULT_READINESS_SELECTOR.to_string(),
            readiness_timeout_secs: DEFAULT_READINESS_TIMEOUT_SECS,
            readiness_poll_interval_ms: DEFAULT_READINESS_POLL_INTERVAL_MS,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
            dashboard_viewport_width: DEFAULT_DASHBOARD_VIEWPORT_WIDTH,
            insight_viewport_width: DEFAULT_INSIGHT_VIEWPORT_WIDTH,
            token_secret: None,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            _phantom: PhantomData,
        }
    }
}

impl ExporterConfig {
    /// Create a builder for configuring an `ExporterConfig` with a fluent interface
    #[must_use]
    pub fn builder() -> ExporterConfigBuilder<()> {
        ExporterConfigBuilder::default()
    }
}

impl ExporterConfigBuilder<()> {
    /// Set the base URL of the web app. Must be an absolute http(s) URL.
    pub fn site_url(self, site_url: impl AsRef<str>) -> Result<ExporterConfigBuilder<WithSiteUrl>> {
        let raw = site_url.as_ref();
        let parsed = Url::parse(raw).map_err(|e| anyhow!("Invalid site URL '{raw}': {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("Site URL must use http or https, got '{}'", parsed.scheme());
        }

        Ok(ExporterConfigBuilder {
            site_url: Some(parsed),
            scratch_dir: self.scratch_dir,
            pool_size: self.pool_size,
            headless: self.headless,
            readiness_selector: self.readiness_selector,
            readiness_timeout_secs: self.readiness_timeout_secs,
            readiness_poll_interval_ms: self.readiness_poll_interval_ms,
            job_timeout_secs: self.job_timeout_secs,
            dashboard_viewport_width: self.dashboard_viewport_width,
            insight_viewport_width: self.insight_viewport_width,
            token_secret: self.token_secret,
            token_ttl_secs: self.token_ttl_secs,
            _phantom: PhantomData,
        })
    }
}

// Methods available for all states
impl<State> ExporterConfigBuilder<State> {
    #[must_use]
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Headed mode is a debugging aid; release builds override it to headless.
    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    #[must_use]
    pub fn readiness_selector(mut self, selector: impl Into<String>) -> Self {
        self.readiness_selector = selector.into();
        self
    }

    #[must_use]
    pub fn readiness_timeout_secs(mut self, secs: u64) -> Self {
        self.readiness_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn readiness_poll_interval_ms(mut self, millis: u64) -> Self {
        self.readiness_poll_interval_ms = millis;
        self
    }

    #[must_use]
    pub fn job_timeout_secs(mut self, secs: u64) -> Self {
        self.job_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn dashboard_viewport_width(mut self, width: u32) -> Self {
        self.dashboard_viewport_width = width;
        self
    }

    #[must_use]
    pub fn insight_viewport_width(mut self, width: u32) -> Self {
        self.insight_viewport_width = width;
        self
    }

    #[must_use]
    pub fn token_secret(mut self, secret: Option<String>) -> Self {
        self.token_secret = secret.filter(|s| !s.is_empty());
        self
    }

    #[must_use]
    pub fn token_ttl_secs(mut self, secs: u64) -> Self {
        self.token_ttl_secs = secs;
        self
    }
}

impl ExporterConfigBuilder<WithSiteUrl> {
    /// Validate and build the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a size or timeout is zero or the selector is empty.
    pub fn build(self) -> Result<ExporterConfig> {
        let site_url = self
            .site_url
            .ok_or_else(|| anyhow!("site_url missing in WithSiteUrl state"))?;

        if self.pool_size == 0 {
            bail!("pool_size must be at least 1");
        }
        if self.readiness_selector.trim().is_empty() {
            bail!("readiness_selector must not be empty");
        }
        if self.readiness_timeout_secs == 0 || self.job_timeout_secs == 0 {
            bail!("timeouts must be greater than zero");
        }
        if self.readiness_poll_interval_ms == 0 {
            bail!("readiness_poll_interval_ms must be greater than zero");
        }
        if self.dashboard_viewport_width == 0 || self.insight_viewport_width == 0 {
            bail!("viewport widths must be greater than zero");
        }

        let headless = if cfg!(debug_assertions) || self.headless {
            self.headless
        } else {
            warn!("Headed browser mode requested in a release build; forcing headless");
            true
        };

        Ok(ExporterConfig {
            site_url,
            scratch_dir: self.scratch_dir.unwrap_or_else(std::env::temp_dir),
            pool_size: self.pool_size,
            headless,
            readiness_selector: self.readiness_selector,
            readiness_timeout_secs: self.readiness_timeout_secs,
            readiness_poll_interval_ms: self.readiness_poll_interval_ms,
            job_timeout_secs: self.job_timeout_secs,
            dashboard_viewport_width: self.dashboard_viewport_width,
            insight_viewport_width: self.insight_viewport_width,
            token_secret: self.token_secret,
            token_ttl_secs: self.token_ttl_secs,
        })
    }
}
