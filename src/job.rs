//! Export job runner
//!
//! A job goes `Pending -> Rendering -> Succeeded | Failed`. There is no retry
//! state: a failed job is logged with its identity and the error is returned
//! so the scheduler that submitted it can decide what to do.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use url::Url;

use crate::asset::{AssetId, AssetStore, ExportFormat, TargetKind};
use crate::config::ExporterConfig;
use crate::error::{ExportError, ExportResult};
use crate::render::{CaptureResult, RenderCapture, RenderTarget};
use crate::scratch::ScratchFile;
use crate::timeout::with_job_timeout;
use crate::token::{ExportReference, TokenIssuer};

/// Job payload as submitted by the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resolve", rename_all = "snake_case")]
pub enum ExportJob {
    /// Target given inline; the artifact is returned, not persisted
    Direct {
        export_type: String,
        resource_id: String,
        #[serde(default = "default_format")]
        export_format: ExportFormat,
    },
    /// Target read from the durable record, which also receives the artifact
    Asset { asset_id: AssetId },
}

fn default_format() -> ExportFormat {
    ExportFormat::Png
}

impl ExportJob {
    pub fn direct(export_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self::Direct {
            export_type: export_type.into(),
            resource_id: resource_id.into(),
            export_format: ExportFormat::Png,
        }
    }

    #[must_use]
    pub fn asset(asset_id: AssetId) -> Self {
        Self::Asset { asset_id }
    }
}

impl fmt::Display for ExportJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct {
                export_type,
                resource_id,
                ..
            } => write!(f, "{export_type}:{resource_id}"),
            Self::Asset { asset_id } => write!(f, "asset:{asset_id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Rendering,
    Succeeded,
    Failed,
}

impl JobState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Rendering => "rendering",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// Result of a successful job
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub asset_id: Option<AssetId>,
    pub target_kind: TargetKind,
    pub target_id: String,
    pub content_type: String,
    pub bytes_len: usize,
    /// Captured bytes for direct jobs; asset jobs hand them to the store
    pub content: Option<Vec<u8>>,
}

/// Job parameters after resolving the payload
#[derive(Debug, Clone)]
struct ResolvedJob {
    asset_id: Option<AssetId>,
    target_kind: String,
    target_id: String,
    export_format: ExportFormat,
}

/// Build the render URL `<site_url>/exporter/<token>`
///
/// The web app must serve its export render page on this route. The older
/// Python exporter rendered `<site_url>/shared_dashboard/<token>` instead;
/// the two are not interchangeable.
pub fn render_url(
    site_url: &Url,
    tokens: &dyn TokenIssuer,
    kind: TargetKind,
    target_id: &str,
) -> ExportResult<String> {
    let token = tokens.issue(&ExportReference::new(kind.as_str(), target_id))?;

    let mut url = site_url.clone();
    url.path_segments_mut()
        .map_err(|()| ExportError::Navigation {
            url: site_url.to_string(),
            message: "site URL cannot be a base".to_string(),
        })?
        .pop_if_empty()
        .push("exporter")
        .push(&token);
    Ok(url.into())
}

pub struct ExportRunner<R> {
    config: Arc<ExporterConfig>,
    renderer: R,
    store: Arc<dyn AssetStore>,
    tokens: Arc<dyn TokenIssuer>,
}

impl<R: RenderCapture> ExportRunner<R> {
    /// Runner using the token scheme selected by `config`
    pub fn new(config: Arc<ExporterConfig>, renderer: R, store: Arc<dyn AssetStore>) -> Self {
        let tokens = config.token_issuer();
        Self::with_tokens(config, renderer, store, tokens)
    }

    pub fn with_tokens(
        config: Arc<ExporterConfig>,
        renderer: R,
        store: Arc<dyn AssetStore>,
        tokens: Arc<dyn TokenIssuer>,
    ) -> Self {
        Self {
            config,
            renderer,
            store,
            tokens,
        }
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Run one job to completion, bounded by the configured job timeout
    pub async fn run(&self, job: &ExportJob) -> ExportResult<JobOutcome> {
        info!(job = %job, state = JobState::Pending.as_str(), "Export job received");

        let resolved = match self.resolve(job).await {
            Ok(resolved) => resolved,
            Err(e) => return Err(log_failure(job, None, e)),
        };

        match self.execute(job, &resolved).await {
            Ok(outcome) => {
                info!(
                    job = %job,
                    asset_id = ?outcome.asset_id,
                    target_kind = %outcome.target_kind,
                    target_id = %outcome.target_id,
                    bytes = outcome.bytes_len,
                    state = JobState::Succeeded.as_str(),
                    "Export job succeeded"
                );
                Ok(outcome)
            }
            Err(e) => Err(log_failure(job, Some(&resolved), e)),
        }
    }

    async fn resolve(&self, job: &ExportJob) -> ExportResult<ResolvedJob> {
        match job {
            ExportJob::Direct {
                export_type,
                resource_id,
                export_format,
            } => Ok(ResolvedJob {
                asset_id: None,
                target_kind: export_type.clone(),
                target_id: resource_id.clone(),
                export_format: *export_format,
            }),
            ExportJob::Asset { asset_id } => {
                let asset = self.store.load(*asset_id).await?;
                Ok(ResolvedJob {
                    asset_id: Some(asset.id),
                    target_kind: asset.target_kind,
                    target_id: asset.target_id,
                    export_format: asset.export_format,
                })
            }
        }
    }

    async fn execute(&self, job: &ExportJob, resolved: &ResolvedJob) -> ExportResult<JobOutcome> {
        // Unknown kinds fail here, before any browser interaction
        let kind = TargetKind::from_str(&resolved.target_kind)?;
        let target = self.render_target(kind, &resolved.target_id)?;

        let scratch_dir = self.config.scratch_dir();
        tokio::fs::create_dir_all(scratch_dir).await.map_err(|e| {
            ExportError::CaptureIoFailure(format!(
                "Failed to create scratch directory {}: {e}",
                scratch_dir.display()
            ))
        })?;
        let scratch = ScratchFile::reserve(scratch_dir, resolved.export_format.extension());

        info!(
            job = %job,
            target_kind = %kind,
            target_id = %resolved.target_id,
            url = %target.url,
            state = JobState::Rendering.as_str(),
            "Rendering export"
        );

        let captured = with_job_timeout(
            self.renderer
                .capture(&target, resolved.export_format, scratch.path()),
            self.config.job_timeout_secs(),
        )
        .await;

        // The renderer owns cleanup; this only catches a renderer that did not
        if scratch.remove() {
            warn!(job = %job, "Renderer left its scratch file behind");
        }

        let CaptureResult { bytes, .. } = captured?;
        let bytes_len = bytes.len();
        // The stored tag follows the requested format, whatever the renderer reported
        let content_type = resolved.export_format.mime().to_string();

        let content = match resolved.asset_id {
            Some(asset_id) => {
                self.store
                    .save_content(asset_id, bytes, &content_type)
                    .await?;
                None
            }
            None => Some(bytes),
        };

        Ok(JobOutcome {
            asset_id: resolved.asset_id,
            target_kind: kind,
            target_id: resolved.target_id.clone(),
            content_type,
            bytes_len,
            content,
        })
    }

    fn render_target(&self, kind: TargetKind, target_id: &str) -> ExportResult<RenderTarget> {
        Ok(RenderTarget {
            url: render_url(
                self.config.site_url(),
                self.tokens.as_ref(),
                kind,
                target_id,
            )?,
            viewport_width_initial: self.config.viewport_width(kind),
            readiness_selector: self.config.readiness_selector().to_string(),
        })
    }
}

fn log_failure(job: &ExportJob, resolved: Option<&ResolvedJob>, err: ExportError) -> ExportError {
    error!(
        job = %job,
        asset_id = ?resolved.and_then(|r| r.asset_id),
        target_kind = resolved.map_or("unresolved", |r| r.target_kind.as_str()),
        target_id = resolved.map_or("", |r| r.target_id.as_str()),
        error_kind = err.kind(),
        error = %err,
        state = JobState::Failed.as_str(),
        "Export job failed"
    );
    err
}
