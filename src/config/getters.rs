//! Read accessors for `ExporterConfig`

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::types::ExporterConfig;
use crate::asset::TargetKind;
use crate::token::{PlainTokenIssuer, SignedTokenIssuer, TokenIssuer};

impl ExporterConfig {
    #[must_use]
    pub fn site_url(&self) -> &Url {
        &self.site_url
    }

    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn readiness_selector(&self) -> &str {
        &self.readiness_selector
    }

    #[must_use]
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    #[must_use]
    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_interval_ms)
    }

    #[must_use]
    pub fn job_timeout_secs(&self) -> u64 {
        self.job_timeout_secs
    }

    /// Initial viewport width for the given target kind
    #[must_use]
    pub fn viewport_width(&self, kind: TargetKind) -> u32 {
        match kind {
            TargetKind::Dashboard => self.dashboard_viewport_width,
            TargetKind::Insight => self.insight_viewport_width,
        }
    }

    #[must_use]
    pub fn token_ttl_secs(&self) -> u64 {
        self.token_ttl_secs
    }

    #[must_use]
    pub fn has_token_secret(&self) -> bool {
        self.token_secret.is_some()
    }

    /// Token issuer matching the configured scheme
    #[must_use]
    pub fn token_issuer(&self) -> Arc<dyn TokenIssuer> {
        match &self.token_secret {
            Some(secret) => Arc::new(SignedTokenIssuer::new(
                secret.as_bytes().to_vec(),
                self.token_ttl_secs,
            )),
            None => Arc::new(PlainTokenIssuer),
        }
    }
}
