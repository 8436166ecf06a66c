//! Durable storage seam.
//!
//! Only the track flags, marketplace metadata, folder configuration and
//! cached scan results survive restarts; everything else in the engine is
//! rebuilt from them. The service crate provides the sqlite implementation;
//! [`MemoryStore`] backs tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use shared::status::{Folder, FolderStats};
use shared::track::Track;

use crate::error::Result;
use crate::keys;

#[async_trait]
pub trait FlagStore: Send + Sync {
    async fn load_tracks(&self) -> Result<Vec<Track>>;

    /// Write-through for one mutated track, keyed by (artist, title).
    async fn save_track(&self, track: &Track) -> Result<()>;

    async fn load_folders(&self) -> Result<Vec<Folder>>;

    async fn save_folder_stats(&self, stats: &FolderStats) -> Result<()>;
}

/// In-memory store, no durability.
#[derive(Default)]
pub struct MemoryStore {
    tracks: Mutex<HashMap<String, Track>>,
    folders: Mutex<Vec<Folder>>,
    stats: Mutex<HashMap<String, FolderStats>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_folders(folders: Vec<Folder>) -> Self {
        let store = Self::new();
        *store.folders.lock().unwrap() = folders;
        store
    }
}

#[async_trait]
impl FlagStore for MemoryStore {
    async fn load_tracks(&self) -> Result<Vec<Track>> {
        Ok(self.tracks.lock().unwrap().values().cloned().collect())
    }

    async fn save_track(&self, track: &Track) -> Result<()> {
        let key = keys::normalize(&track.artist, &track.title)
            .primary()
            .to_string();
        self.tracks.lock().unwrap().insert(key, track.clone());
        Ok(())
    }

    async fn load_folders(&self) -> Result<Vec<Folder>> {
        Ok(self.folders.lock().unwrap().clone())
    }

    async fn save_folder_stats(&self, stats: &FolderStats) -> Result<()> {
        self.stats
            .lock()
            .unwrap()
            .insert(stats.path.clone(), stats.clone());
        Ok(())
    }
}
