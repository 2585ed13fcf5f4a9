//! In-process asset store
//!
//! Backed by a `DashMap`; used by tests and by `render` runs that never
//! touch a database.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::{AssetId, AssetStore, ExportedAsset, NewAsset};
use crate::error::{ExportError, ExportResult};

#[derive(Debug, Default)]
pub struct InMemoryAssetStore {
    assets: DashMap<AssetId, ExportedAsset>,
    next_id: AtomicI64,
    writes: AtomicI64,
}

impl InMemoryAssetStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed record, replacing any record with the same id
    pub fn insert(&self, asset: ExportedAsset) {
        self.next_id.fetch_max(asset.id, Ordering::Relaxed);
        self.assets.insert(asset.id, asset);
    }

    #[must_use]
    pub fn get(&self, asset_id: AssetId) -> Option<ExportedAsset> {
        self.assets.get(&asset_id).map(|entry| entry.clone())
    }

    /// Number of `save_content` calls that reached the store
    #[must_use]
    pub fn content_writes(&self) -> i64 {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn load(&self, asset_id: AssetId) -> ExportResult<ExportedAsset> {
        self.get(asset_id).ok_or(ExportError::AssetNotFound(asset_id))
    }

    async fn save_content(
        &self,
        asset_id: AssetId,
        content: Vec<u8>,
        content_type: &str,
    ) -> ExportResult<()> {
        let mut entry = self
            .assets
            .get_mut(&asset_id)
            .ok_or(ExportError::AssetNotFound(asset_id))?;
        entry.content = Some(content);
        entry.content_type = Some(content_type.to_string());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn create(&self, asset: NewAsset) -> ExportResult<AssetId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.assets.insert(
            id,
            ExportedAsset {
                id,
                target_kind: asset.target_kind.as_str().to_string(),
                target_id: asset.target_id,
                export_format: asset.export_format,
                dashboard_name: asset.dashboard_name,
                insight_name: asset.insight_name,
                content: None,
                content_type: None,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }
}
