//! The browser operations the render engine depends on
//!
//! [`RenderSession`] is the seam between the capture procedure and a concrete
//! driver. The Chromium implementation lives in [`super::chromium`]; tests
//! substitute scripted sessions.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// One browser-driver session with a single active page
#[async_trait]
pub trait RenderSession: Send + Sync + 'static {
    /// Resize the viewport (CSS pixels)
    async fn set_viewport(&self, width: u32, height: u32) -> Result<()>;

    /// Load `url` and wait for the navigation to commit
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Single check: does an element matching `selector` exist right now?
    async fn has_element(&self, selector: &str) -> Result<bool>;

    /// Evaluate a script in the page and return its JSON value
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Write a PNG of the current viewport to `path`
    async fn save_screenshot(&self, path: &Path) -> Result<()>;

    /// Print the page to a PDF at `path`
    async fn save_pdf(&self, path: &Path) -> Result<()>;

    /// Cheap liveness check used before handing out an idle session
    async fn is_alive(&self) -> bool;

    /// Terminate the browser process and release its resources
    async fn close(&mut self) -> Result<()>;
}

/// Starts new sessions for the driver pool
#[async_trait]
pub trait SessionLauncher: Send + Sync + 'static {
    type Session: RenderSession;

    /// Expensive: may download a browser binary and spawn a process
    async fn launch(&self) -> Result<Self::Session>;
}
