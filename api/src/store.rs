//! Sqlite-backed implementation of the engine's storage seam.

use async_trait::async_trait;
use beatshelf::error::{EngineError, Result};
use beatshelf::FlagStore;
use shared::status::{Folder, FolderStats};
use shared::track::Track;
use sqlx::SqlitePool;

use crate::models::{folder, track::TrackRow};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FlagStore for SqliteStore {
    async fn load_tracks(&self) -> Result<Vec<Track>> {
        let rows = TrackRow::get_all(&self.pool)
            .await
            .map_err(EngineError::Store)?;
        Ok(rows.into_iter().map(Track::from).collect())
    }

    async fn save_track(&self, track: &Track) -> Result<()> {
        TrackRow::upsert(&self.pool, track)
            .await
            .map_err(EngineError::Store)
    }

    async fn load_folders(&self) -> Result<Vec<Folder>> {
        let folders = folder::Folder::get_all(&self.pool)
            .await
            .map_err(EngineError::Store)?;
        Ok(folders
            .into_iter()
            .map(|f| Folder {
                id: f.id,
                name: f.name,
                path: f.path,
            })
            .collect())
    }

    async fn save_folder_stats(&self, stats: &FolderStats) -> Result<()> {
        sqlx::query("UPDATE folders SET scanned = ?, matched = ? WHERE path = ?")
            .bind(stats.scanned as i64)
            .bind(stats.matched as i64)
            .bind(&stats.path)
            .execute(&self.pool)
            .await
            .map_err(|e| EngineError::Store(e.to_string()))?;
        Ok(())
    }
}
