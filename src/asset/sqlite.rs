//! SQLite-backed asset store
//!
//! Stores export records and their binary content in a single table. Uses WAL
//! mode so the API side can read `has_content` while workers write.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::{AssetId, AssetStore, ExportFormat, ExportedAsset, NewAsset};
use crate::error::{ExportError, ExportResult};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS exported_assets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_kind TEXT NOT NULL,
    target_id TEXT NOT NULL,
    export_format TEXT NOT NULL,
    dashboard_name TEXT,
    insight_name TEXT,
    content BLOB,
    content_type TEXT,
    created_at TEXT NOT NULL
);
"#;

#[derive(Clone)]
pub struct SqliteAssetStore {
    pool: SqlitePool,
}

impl SqliteAssetStore {
    /// Open (or create) the database file and ensure the schema exists
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to open SQLite database")?;

        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("Failed to initialize database schema")?;

        Ok(Self { pool })
    }

    /// In-memory database, mostly for tests
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite database")?;

        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("Failed to initialize database schema")?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl AssetStore for SqliteAssetStore {
    async fn load(&self, asset_id: AssetId) -> ExportResult<ExportedAsset> {
        let row = sqlx::query(
            "SELECT id, target_kind, target_id, export_format, dashboard_name, insight_name, \
             content, content_type, created_at FROM exported_assets WHERE id = ?",
        )
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ExportError::AssetNotFound(asset_id))?;

        let export_format: String = row.try_get("export_format")?;
        let created_at: String = row.try_get("created_at")?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| ExportError::Storage(format!("bad created_at on asset {asset_id}: {e}")))?
            .with_timezone(&Utc);

        Ok(ExportedAsset {
            id: row.try_get("id")?,
            target_kind: row.try_get("target_kind")?,
            target_id: row.try_get("target_id")?,
            export_format: ExportFormat::from_str(&export_format)?,
            dashboard_name: row.try_get("dashboard_name")?,
            insight_name: row.try_get("insight_name")?,
            content: row.try_get("content")?,
            content_type: row.try_get("content_type")?,
            created_at,
        })
    }

    async fn save_content(
        &self,
        asset_id: AssetId,
        content: Vec<u8>,
        content_type: &str,
    ) -> ExportResult<()> {
        let result = sqlx::query(
            "UPDATE exported_assets SET content = ?, content_type = ? WHERE id = ?",
        )
        .bind(content)
        .bind(content_type)
        .bind(asset_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ExportError::AssetNotFound(asset_id));
        }
        Ok(())
    }

    async fn create(&self, asset: NewAsset) -> ExportResult<AssetId> {
        let result = sqlx::query(
            "INSERT INTO exported_assets \
             (target_kind, target_id, export_format, dashboard_name, insight_name, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(asset.target_kind.as_str())
        .bind(&asset.target_id)
        .bind(asset.export_format.mime())
        .bind(&asset.dashboard_name)
        .bind(&asset.insight_name)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }
}
