//! The engine facade.
//!
//! Everything the presentation layer may do goes through [`SyncEngine`]:
//! synchronous flag operations validate and apply immediately, remote work
//! is admitted through the single-flight scheduler. No caller ever touches
//! the inventory or the queues directly.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::job::{Admission, JobKind, QueueKind, SearchScope};
use shared::progress::Progress;
use shared::status::StatusSnapshot;
use shared::track::{Track, TrackRef, TrackState};
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::inventory::Inventory;
use crate::operator::RemoteOperator;
use crate::progress::ProgressChannel;
use crate::runner::RunnerContext;
use crate::scheduler::{JobSpec, QueuePolicy, Scheduler};
use crate::store::{FlagStore, MemoryStore};

pub struct SyncEngine {
    inventory: Arc<RwLock<Inventory>>,
    scheduler: Scheduler,
    progress: ProgressChannel,
    store: Arc<dyn FlagStore>,
    operator: Arc<dyn RemoteOperator>,
}

pub struct SyncEngineBuilder {
    operator: Option<Arc<dyn RemoteOperator>>,
    store: Option<Arc<dyn FlagStore>>,
    download_dir: PathBuf,
    policy: QueuePolicy,
}

impl SyncEngineBuilder {
    pub fn new() -> Self {
        Self {
            operator: None,
            store: None,
            download_dir: PathBuf::from("downloads"),
            policy: QueuePolicy::default(),
        }
    }

    pub fn operator(mut self, operator: impl RemoteOperator + 'static) -> Self {
        self.operator = Some(Arc::new(operator));
        self
    }

    pub fn store(mut self, store: impl FlagStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn queue_policy(mut self, policy: QueuePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Load persisted state and wire the engine together.
    pub async fn build(self) -> Result<SyncEngine> {
        let operator = self.operator.ok_or(EngineError::NotConfigured)?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn FlagStore>);

        let tracks = store.load_tracks().await?;
        info!("Loaded {} persisted tracks", tracks.len());
        let inventory = Arc::new(RwLock::new(Inventory::from_tracks(tracks)));
        let progress = ProgressChannel::new();

        let ctx = RunnerContext {
            operator: Arc::clone(&operator),
            inventory: Arc::clone(&inventory),
            progress: progress.clone(),
            store: Arc::clone(&store),
            download_dir: self.download_dir,
        };

        Ok(SyncEngine {
            scheduler: Scheduler::new(ctx, self.policy),
            inventory,
            progress,
            store,
            operator,
        })
    }
}

impl Default for SyncEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEngine {
    async fn persist(&self, track: &Track) {
        if let Err(e) = self.store.save_track(track).await {
            warn!("Failed to persist '{} - {}': {}", track.artist, track.title, e);
        }
    }

    async fn require_known(&self, track: &TrackRef) -> Result<Track> {
        self.inventory
            .read()
            .await
            .get(track)
            .cloned()
            .ok_or(EngineError::UnknownTrack)
    }

    // --- read side --------------------------------------------------------

    pub async fn status(&self) -> StatusSnapshot {
        let queues = self.scheduler.queues_snapshot();
        self.inventory.read().await.snapshot(queues)
    }

    pub fn progress(&self) -> Progress {
        self.progress.read()
    }

    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    /// Kind of the job currently holding the single-flight slot.
    pub fn running_kind(&self) -> Option<JobKind> {
        self.scheduler.running_kind()
    }

    pub async fn operator_healthy(&self) -> bool {
        self.operator.health_check().await
    }

    // --- source ingestion -------------------------------------------------

    /// Merge a batch of recognition-feed entries, returning how many
    /// records were touched.
    pub async fn import_recognized(
        &self,
        entries: Vec<(TrackRef, DateTime<Utc>)>,
    ) -> usize {
        let changed = {
            let mut inv = self.inventory.write().await;
            entries
                .iter()
                .map(|(track, at)| inv.upsert_recognized(track, *at).clone())
                .collect::<Vec<_>>()
        };
        for t in &changed {
            self.persist(t).await;
        }
        changed.len()
    }

    // --- job submissions --------------------------------------------------

    pub fn rescan(&self, folder: Option<String>) -> Admission {
        self.scheduler.submit(JobSpec::Rescan(folder))
    }

    pub async fn search_one(&self, track: TrackRef) -> Result<Admission> {
        self.require_known(&track).await?;
        Ok(self.scheduler.submit(JobSpec::SearchOne(track)))
    }

    pub fn search_all(&self, scope: SearchScope) -> Admission {
        self.scheduler.submit(JobSpec::SearchAll(scope))
    }

    pub fn sync_favorites(&self) -> Admission {
        self.scheduler.submit(JobSpec::SyncFavorites)
    }

    pub async fn star(&self, track: TrackRef) -> Result<Admission> {
        self.require_known(&track).await?;
        Ok(self.scheduler.submit(JobSpec::StarOne(track)))
    }

    pub async fn unstar(&self, track: TrackRef) -> Result<Admission> {
        let known = self.require_known(&track).await?;
        if known.marketplace_url.is_none() {
            return Err(EngineError::MissingUrl);
        }
        Ok(self.scheduler.submit(JobSpec::UnstarOne {
            track,
            dismiss: false,
        }))
    }

    pub fn star_batch(&self, tracks: Vec<TrackRef>) -> Admission {
        self.scheduler.submit(JobSpec::StarBatch(tracks))
    }

    pub async fn download(&self, track: TrackRef) -> Result<Admission> {
        let known = self.require_known(&track).await?;
        if known.marketplace_url.is_none() {
            return Err(EngineError::MissingUrl);
        }
        let state = known.state();
        if state != TrackState::ToDownload {
            return Err(EngineError::InvalidTransition {
                op: "download",
                state,
            });
        }
        Ok(self.scheduler.submit(JobSpec::Download(track)))
    }

    pub async fn download_queue(&self, tracks: Vec<TrackRef>) -> Vec<Admission> {
        let mut admissions = Vec::with_capacity(tracks.len());
        for track in tracks {
            match self.download(track).await {
                Ok(admission) => admissions.push(admission),
                Err(e) => admissions.push(Admission::Rejected {
                    reason: e.to_string(),
                }),
            }
        }
        admissions
    }

    // --- dismiss lifecycle ------------------------------------------------

    /// Dismissing unfavorites remotely first, then strikes the track
    /// through; the flags land when the unstar job completes.
    pub async fn dismiss(&self, track: TrackRef) -> Result<Admission> {
        self.inventory.read().await.check_dismiss(&track)?;
        Ok(self.scheduler.submit(JobSpec::UnstarOne {
            track,
            dismiss: true,
        }))
    }

    /// Undismissing clears the flag immediately and, when a marketplace URL
    /// is known, re-stars remotely.
    pub async fn undismiss(&self, track: TrackRef) -> Result<(Track, Option<Admission>)> {
        let updated = {
            let mut inv = self.inventory.write().await;
            inv.apply_undismiss(&track)?
        };
        self.persist(&updated).await;

        let admission = if updated.marketplace_url.is_some() {
            Some(self.scheduler.submit(JobSpec::StarOne(track)))
        } else {
            None
        };
        Ok((updated, admission))
    }

    pub async fn clear_dismissed(&self, track: TrackRef) -> Result<Track> {
        let updated = {
            let mut inv = self.inventory.write().await;
            inv.clear_dismissed(&track)?
        };
        self.persist(&updated).await;
        Ok(updated)
    }

    // --- synchronous flag operations --------------------------------------

    pub async fn skip(&self, track: TrackRef) -> Result<Track> {
        let updated = {
            let mut inv = self.inventory.write().await;
            inv.skip(&track)?
        };
        self.persist(&updated).await;
        Ok(updated)
    }

    pub async fn unskip(&self, track: TrackRef) -> Result<Track> {
        let updated = {
            let mut inv = self.inventory.write().await;
            inv.unskip(&track)?
        };
        self.persist(&updated).await;
        Ok(updated)
    }

    /// Clear every confirmed-negative flag, leaving all other state alone.
    pub async fn reset_not_found(&self) -> usize {
        let changed = {
            let mut inv = self.inventory.write().await;
            inv.reset_not_found()
        };
        for t in &changed {
            self.persist(t).await;
        }
        changed.len()
    }

    // --- queue management -------------------------------------------------

    pub fn remove_from_queue(&self, queue: QueueKind, track: &TrackRef) -> bool {
        self.scheduler.withdraw(queue, track)
    }

    /// Cooperative stop of the running job, if any.
    pub fn stop(&self) -> bool {
        self.scheduler.stop()
    }
}
