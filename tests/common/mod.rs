//! Test doubles shared by the render_exporter test suite
//!
//! Nothing here starts a real browser: `MockLauncher` hands out scripted
//! `MockSession`s and `StubRenderer` replaces the whole render path.

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use render_exporter::{
    CaptureResult, ExportError, ExportFormat, ExportResult, ExporterConfig, RenderCapture,
    RenderSession, RenderTarget, SessionLauncher,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_SITE_URL: &str = "http://exporter.test";

/// Config pointing scratch files at `scratch_dir` with short waits
pub fn test_config(scratch_dir: &Path) -> ExporterConfig {
    ExporterConfig::builder()
        .site_url(TEST_SITE_URL)
        .unwrap()
        .scratch_dir(scratch_dir)
        .readiness_timeout_secs(1)
        .readiness_poll_interval_ms(10)
        .job_timeout_secs(5)
        .build()
        .unwrap()
}

/// Number of regular files left in `dir`
pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.flatten().filter(|e| e.path().is_file()).count())
        .unwrap_or(0)
}

// =============================================================================
// Scripted session
// =============================================================================

/// Procedure step at which a `MockSession` fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    BootstrapViewport,
    Navigate,
    /// Selector never appears
    Readiness,
    /// Element lookup errors, as with a crashed page
    ElementLookup,
    Evaluate,
    ResizeViewport,
    /// Writes half an artifact, then errors
    Capture,
}

#[derive(Debug, Clone)]
pub struct SessionScript {
    pub fail_at: Option<FailAt>,
    /// Lookups answering "not yet" before the selector shows up
    pub checks_before_ready: usize,
    pub content_height: serde_json::Value,
    pub artifact: Vec<u8>,
}

impl Default for SessionScript {
    fn default() -> Self {
        Self {
            fail_at: None,
            checks_before_ready: 2,
            content_height: serde_json::json!(1234.4),
            artifact: b"PNGDATA".to_vec(),
        }
    }
}

/// Shared record of every call made on any session of a launcher
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub struct MockSession {
    pub id: usize,
    script: SessionScript,
    calls: CallLog,
    checks: AtomicUsize,
    viewport_calls: AtomicUsize,
    alive: Arc<AtomicBool>,
}

impl MockSession {
    pub fn new(id: usize, script: SessionScript, calls: CallLog, alive: Arc<AtomicBool>) -> Self {
        Self {
            id,
            script,
            calls,
            checks: AtomicUsize::new(0),
            viewport_calls: AtomicUsize::new(0),
            alive,
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn fails_at(&self, step: FailAt) -> bool {
        self.script.fail_at == Some(step)
    }
}

#[async_trait]
impl RenderSession for MockSession {
    async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        self.record(format!("viewport:{width}x{height}"));
        let first = self.viewport_calls.fetch_add(1, Ordering::SeqCst) == 0;
        if (first && self.fails_at(FailAt::BootstrapViewport))
            || (!first && self.fails_at(FailAt::ResizeViewport))
        {
            return Err(anyhow!("device metrics rejected"));
        }
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.record(format!("navigate:{url}"));
        if self.fails_at(FailAt::Navigate) {
            return Err(anyhow!("net::ERR_CONNECTION_REFUSED"));
        }
        Ok(())
    }

    async fn has_element(&self, selector: &str) -> Result<bool> {
        self.record(format!("find:{selector}"));
        if self.fails_at(FailAt::Readiness) {
            return Ok(false);
        }
        if self.fails_at(FailAt::ElementLookup) {
            return Err(anyhow!("Target closed"));
        }
        let seen = self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(seen >= self.script.checks_before_ready)
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        self.record(format!("evaluate:{script}"));
        if self.fails_at(FailAt::Evaluate) {
            return Err(anyhow!("Uncaught TypeError: document.body is null"));
        }
        Ok(self.script.content_height.clone())
    }

    async fn save_screenshot(&self, path: &Path) -> Result<()> {
        self.record("screenshot".to_string());
        self.write_artifact(path)
    }

    async fn save_pdf(&self, path: &Path) -> Result<()> {
        self.record("pdf".to_string());
        self.write_artifact(path)
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<()> {
        self.record(format!("close:{}", self.id));
        Ok(())
    }
}

impl MockSession {
    fn write_artifact(&self, path: &Path) -> Result<()> {
        if self.fails_at(FailAt::Capture) {
            let half = &self.script.artifact[..self.script.artifact.len() / 2];
            std::fs::write(path, half)?;
            return Err(anyhow!("No space left on device"));
        }
        std::fs::write(path, &self.script.artifact)?;
        Ok(())
    }
}

// =============================================================================
// Counting launcher
// =============================================================================

#[derive(Clone, Default)]
pub struct MockLauncher {
    pub launches: Arc<AtomicUsize>,
    /// Number of upcoming launches that fail
    pub failures_remaining: Arc<AtomicUsize>,
    pub launch_delay: Duration,
    pub script: SessionScript,
    pub calls: CallLog,
    /// Health of every session this launcher produced
    pub alive: Arc<AtomicBool>,
}

impl MockLauncher {
    pub fn new(script: SessionScript) -> Self {
        Self {
            script,
            alive: Arc::new(AtomicBool::new(true)),
            ..Self::default()
        }
    }

    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn navigations(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with("navigate:"))
            .count()
    }
}

#[async_trait]
impl SessionLauncher for MockLauncher {
    type Session = MockSession;

    async fn launch(&self) -> Result<MockSession> {
        if !self.launch_delay.is_zero() {
            tokio::time::sleep(self.launch_delay).await;
        }

        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(anyhow!("chromium exited with status 127"));
        }

        let id = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockSession::new(
            id,
            self.script.clone(),
            Arc::clone(&self.calls),
            Arc::clone(&self.alive),
        ))
    }
}

// =============================================================================
// Stub renderer
// =============================================================================

#[derive(Debug, Clone)]
pub enum StubResponse {
    Bytes(Vec<u8>),
    RenderTimeout,
}

/// Replaces the browser path entirely, recording what it was asked to do
pub struct StubRenderer {
    pub response: StubResponse,
    /// Simulate a renderer that forgets to delete its scratch file
    pub leave_file: bool,
    pub delay: Option<Duration>,
    /// Content type reported instead of the format's MIME string
    pub reported_content_type: Option<String>,
    pub targets: Mutex<Vec<(RenderTarget, ExportFormat)>>,
    pub scratch_paths: Mutex<Vec<PathBuf>>,
}

impl StubRenderer {
    pub fn new(response: StubResponse) -> Self {
        Self {
            response,
            leave_file: false,
            delay: None,
            reported_content_type: None,
            targets: Mutex::new(Vec::new()),
            scratch_paths: Mutex::new(Vec::new()),
        }
    }

    pub fn targets(&self) -> Vec<(RenderTarget, ExportFormat)> {
        self.targets.lock().unwrap().clone()
    }

    pub fn scratch_paths(&self) -> Vec<PathBuf> {
        self.scratch_paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl RenderCapture for StubRenderer {
    async fn capture(
        &self,
        target: &RenderTarget,
        format: ExportFormat,
        scratch_path: &Path,
    ) -> ExportResult<CaptureResult> {
        self.targets.lock().unwrap().push((target.clone(), format));
        self.scratch_paths
            .lock()
            .unwrap()
            .push(scratch_path.to_path_buf());

        std::fs::write(scratch_path, b"partial")?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if !self.leave_file {
            std::fs::remove_file(scratch_path)?;
        }

        match &self.response {
            StubResponse::Bytes(bytes) => Ok(CaptureResult {
                bytes: bytes.clone(),
                content_type: self
                    .reported_content_type
                    .clone()
                    .unwrap_or_else(|| format.mime().to_string()),
            }),
            StubResponse::RenderTimeout => Err(ExportError::RenderTimeout {
                url: target.url.clone(),
                selector: target.readiness_selector.clone(),
                timeout_secs: 10,
            }),
        }
    }
}
