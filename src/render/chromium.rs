//! Chromium-backed render sessions

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, PrintToPdfParams};
use chromiumoxide::page::{Page, ScreenshotParams};
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::session::{RenderSession, SessionLauncher};
use crate::browser_setup::launch_browser;

/// A Chromium process with one reusable page
///
/// Owns the CDP handler task and the profile directory; both are released
/// on `close()` and, as a fallback, on drop.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
}

impl ChromiumSession {
    fn cleanup_profile_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            info!("Cleaning up browser profile directory: {}", path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(
                    "Failed to clean up profile directory {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }
}

#[async_trait]
impl RenderSession for ChromiumSession {
    async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        let params =
            SetDeviceMetricsOverrideParams::new(i64::from(width), i64::from(height), 1.0, false);
        self.page
            .execute(params)
            .await
            .context("Failed to set device metrics")?;
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.page.goto(url).await.context("Navigation failed")?;
        Ok(())
    }

    async fn has_element(&self, selector: &str) -> Result<bool> {
        // querySelector answers "absent" with null; only transport or target
        // failures surface as errors
        let script = format!(
            "document.querySelector({}) !== null",
            serde_json::to_string(selector)?
        );
        self.page
            .evaluate(script)
            .await
            .context("Readiness check failed")?
            .into_value::<bool>()
            .map_err(|e| anyhow::anyhow!("Unexpected readiness check result: {e}"))
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("Failed to evaluate script")?;
        result
            .into_value::<serde_json::Value>()
            .map_err(|e| anyhow::anyhow!("Failed to read script result: {e}"))
    }

    async fn save_screenshot(&self, path: &Path) -> Result<()> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();
        self.page
            .save_screenshot(params, path)
            .await
            .context("Failed to capture screenshot")?;
        Ok(())
    }

    async fn save_pdf(&self, path: &Path) -> Result<()> {
        let params = PrintToPdfParams {
            print_background: Some(true),
            ..Default::default()
        };
        self.page
            .save_pdf(params, path)
            .await
            .context("Failed to print page to PDF")?;
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        self.browser.version().await.is_ok()
    }

    async fn close(&mut self) -> Result<()> {
        let closed = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            warn!("Failed to wait for browser exit: {e}");
        }
        self.handler.abort();
        self.cleanup_profile_dir();
        closed.context("Failed to close browser")?;
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler.abort();
        self.cleanup_profile_dir();
    }
}

/// Launches headless Chromium sessions with a fresh profile each
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
}

impl ChromiumLauncher {
    #[must_use]
    pub fn new(headless: bool) -> Self {
        Self { headless }
    }
}

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    type Session = ChromiumSession;

    async fn launch(&self) -> Result<ChromiumSession> {
        let user_data_dir =
            std::env::temp_dir().join(format!("render_exporter_chrome_{}", Uuid::new_v4()));
        std::fs::create_dir(&user_data_dir).with_context(|| {
            format!(
                "Failed to create profile directory: {}",
                user_data_dir.display()
            )
        })?;

        let (mut browser, handler) = match launch_browser(self.headless, &user_data_dir).await {
            Ok(launched) => launched,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&user_data_dir);
                return Err(e);
            }
        };

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler.abort();
                let _ = std::fs::remove_dir_all(&user_data_dir);
                return Err(anyhow::anyhow!("Failed to open render page: {e}"));
            }
        };

        Ok(ChromiumSession {
            browser,
            page,
            handler,
            user_data_dir: Some(user_data_dir),
        })
    }
}
