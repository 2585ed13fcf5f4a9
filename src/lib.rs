pub mod asset;
pub mod browser_setup;
pub mod config;
pub mod driver_pool;
pub mod error;
pub mod job;
pub mod render;
pub mod scratch;
pub mod timeout;
pub mod token;
pub mod worker;

pub use asset::{
    AssetId, AssetStore, ExportFormat, ExportedAsset, InMemoryAssetStore, NewAsset,
    SqliteAssetStore, TargetKind,
};
pub use config::ExporterConfig;
pub use driver_pool::{DriverPool, SessionLease};
pub use error::{ExportError, ExportResult};
pub use job::{ExportJob, ExportRunner, JobOutcome, JobState, render_url};
pub use render::{
    BrowserRenderer, CaptureResult, CaptureSettings, ChromiumLauncher, RenderCapture,
    RenderSession, RenderTarget, SessionLauncher,
};
pub use token::{ExportReference, PlainTokenIssuer, SignedTokenIssuer, TokenIssuer};
pub use worker::{ExportWorker, WorkerReport};

use std::sync::Arc;

/// Production renderer type: Chromium sessions behind a driver pool
pub type ChromiumRenderer = BrowserRenderer<ChromiumLauncher>;

/// Wire a Chromium-backed runner from configuration
///
/// The pool starts empty; the first job launches the browser.
pub fn chromium_runner(
    config: Arc<ExporterConfig>,
    store: Arc<dyn AssetStore>,
) -> ExportRunner<ChromiumRenderer> {
    let pool = DriverPool::new(ChromiumLauncher::new(config.headless()), config.pool_size());
    let settings = CaptureSettings {
        readiness_timeout: config.readiness_timeout(),
        poll_interval: config.readiness_poll_interval(),
    };
    ExportRunner::new(config, BrowserRenderer::new(pool, settings), store)
}
