//! Headless render-and-capture
//!
//! [`RenderCapture`] is what the job runner calls. [`BrowserRenderer`] is the
//! production implementation: it leases a session from the [`DriverPool`] and
//! runs [`engine::render_capture`] on it.

pub mod chromium;
pub mod engine;
pub mod session;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::asset::ExportFormat;
use crate::driver_pool::DriverPool;
use crate::error::ExportResult;

pub use chromium::{ChromiumLauncher, ChromiumSession};
pub use engine::{CaptureSettings, CaptureStrategy, render_capture};
pub use session::{RenderSession, SessionLauncher};

/// Fully resolved input for one capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderTarget {
    pub url: String,
    /// Width used for both bootstrap and final viewport
    pub viewport_width_initial: u32,
    pub readiness_selector: String,
}

/// Captured artifact, owned by the caller until persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Produce an artifact for a render target
#[async_trait]
pub trait RenderCapture: Send + Sync {
    /// Capture `target` as `format`, using `scratch_path` as the temporary
    /// file. Implementations must leave nothing at `scratch_path`.
    async fn capture(
        &self,
        target: &RenderTarget,
        format: ExportFormat,
        scratch_path: &Path,
    ) -> ExportResult<CaptureResult>;
}

/// Renders through pooled browser sessions
pub struct BrowserRenderer<L: SessionLauncher> {
    pool: Arc<DriverPool<L>>,
    settings: CaptureSettings,
}

impl<L: SessionLauncher> BrowserRenderer<L> {
    pub fn new(pool: Arc<DriverPool<L>>, settings: CaptureSettings) -> Self {
        Self { pool, settings }
    }

    pub fn pool(&self) -> &Arc<DriverPool<L>> {
        &self.pool
    }
}

#[async_trait]
impl<L: SessionLauncher> RenderCapture for BrowserRenderer<L> {
    async fn capture(
        &self,
        target: &RenderTarget,
        format: ExportFormat,
        scratch_path: &Path,
    ) -> ExportResult<CaptureResult> {
        // Reject before taking a session
        CaptureStrategy::for_format(format)?;

        let mut lease = self.pool.acquire().await?;
        debug!(session_id = lease.id(), url = %target.url, "Leased browser session");

        // Stays dirty if this future errors or is dropped mid-render
        lease.mark_dirty();
        let result =
            render_capture(lease.session(), target, format, scratch_path, self.settings).await;
        if result.is_ok() {
            lease.mark_clean();
        }
        result
    }
}
