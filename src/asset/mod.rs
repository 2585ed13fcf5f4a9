//! Exported asset model and the durable-record collaborator
//!
//! An [`ExportedAsset`] is the persisted record that receives the rendered
//! bytes. The export core never talks to a database directly; it goes through
//! the [`AssetStore`] trait so the runner can be exercised against an
//! in-memory store and deployed against SQLite.

pub mod memory;
pub mod sqlite;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slug::slugify;

use crate::error::{ExportError, ExportResult};

pub use memory::InMemoryAssetStore;
pub use sqlite::SqliteAssetStore;

/// Identifier of a durable export record
pub type AssetId = i64;

/// Kind of resource an export renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Dashboard,
    Insight,
}

impl TargetKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Insight => "insight",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dashboard" => Ok(Self::Dashboard),
            "insight" => Ok(Self::Insight),
            other => Err(ExportError::UnsupportedExportType(other.to_string())),
        }
    }
}

/// Output format, stored MIME-style on the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportFormat {
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "application/pdf")]
    Pdf,
    #[serde(rename = "text/csv")]
    Csv,
}

impl ExportFormat {
    /// MIME string, used verbatim as the content type
    #[must_use]
    pub const fn mime(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Pdf => "application/pdf",
            Self::Csv => "text/csv",
        }
    }

    /// Subtype portion of the MIME string
    #[must_use]
    pub fn extension(&self) -> &'static str {
        let mime = self.mime();
        mime.split_once('/').map_or(mime, |(_, subtype)| subtype)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image/png" | "png" => Ok(Self::Png),
            "application/pdf" | "pdf" => Ok(Self::Pdf),
            "text/csv" | "csv" => Ok(Self::Csv),
            other => Err(ExportError::UnsupportedExportFormat(other.to_string())),
        }
    }
}

/// Persisted export record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedAsset {
    pub id: AssetId,
    /// Kept as the raw stored string so unknown kinds surface at dispatch time
    pub target_kind: String,
    pub target_id: String,
    pub export_format: ExportFormat,
    pub dashboard_name: Option<String>,
    pub insight_name: Option<String>,
    #[serde(skip)]
    pub content: Option<Vec<u8>>,
    pub content_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExportedAsset {
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Download filename: `export[-<dashboard>][-<insight>].<ext>`
    #[must_use]
    pub fn filename(&self) -> String {
        let mut name = String::from("export");
        for part in [&self.dashboard_name, &self.insight_name].into_iter().flatten() {
            let slug = slugify(part);
            if !slug.is_empty() {
                name.push('-');
                name.push_str(&slug);
            }
        }
        name.push('.');
        name.push_str(self.export_format.extension());
        name
    }
}

/// Fields needed to create a record
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub target_kind: TargetKind,
    pub target_id: String,
    pub export_format: ExportFormat,
    pub dashboard_name: Option<String>,
    pub insight_name: Option<String>,
}

/// Durable-record collaborator
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Load a record by id
    async fn load(&self, asset_id: AssetId) -> ExportResult<ExportedAsset>;

    /// Write the produced artifact. Called at most once per successful job.
    async fn save_content(
        &self,
        asset_id: AssetId,
        content: Vec<u8>,
        content_type: &str,
    ) -> ExportResult<()>;

    /// Create a record without content, returning its id
    async fn create(&self, asset: NewAsset) -> ExportResult<AssetId>;
}
