//! End-to-end scheduler and reconciliation behavior, driven through the
//! engine facade with a scripted operator.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use beatshelf::error::Result;
use beatshelf::keys;
use beatshelf::reconcile::PendingSet;
use beatshelf::store::{FlagStore, MemoryStore};
use beatshelf::{
    RemoteFavorite, RemoteOperator, SearchHit, SearchOutcome, StarConfirmation, SyncEngine,
    SyncEngineBuilder,
};
use chrono::Utc;
use shared::job::{Admission, QueueKind, SearchScope};
use shared::progress::JobOutcome;
use shared::status::{Folder, FolderStats};
use shared::track::{Track, TrackRef};
use tokio::sync::Semaphore;

/// Scripted operator: answers instantly, records every call in order, and
/// never overlaps (the concurrency watermark asserts single flight).
#[derive(Clone, Default)]
struct MockOperator {
    calls: Arc<Mutex<Vec<String>>>,
    not_found: Arc<Mutex<HashSet<String>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockOperator {
    fn new() -> Self {
        Self::default()
    }

    fn mark_not_found(&self, track: &TrackRef) {
        self.not_found
            .lock()
            .unwrap()
            .insert(keys::normalize_ref(track).primary().to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: String) -> CallGuard {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(call);
        // A tiny await point so overlapping jobs would actually overlap.
        tokio::time::sleep(Duration::from_millis(1)).await;
        CallGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

struct CallGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteOperator for MockOperator {
    fn id(&self) -> &'static str {
        "mock"
    }

    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn search(&self, track: &TrackRef) -> Result<SearchOutcome> {
        let key = keys::normalize_ref(track).primary().to_string();
        let _guard = self.enter(format!("search:{key}")).await;
        if self.not_found.lock().unwrap().contains(&key) {
            return Ok(SearchOutcome::NotFound);
        }
        Ok(SearchOutcome::Found(SearchHit {
            url: format!("https://market.example/{key}"),
            display_title: track.to_string(),
            match_score: 0.91,
        }))
    }

    async fn star(&self, track: &TrackRef, url: Option<&str>) -> Result<StarConfirmation> {
        let key = keys::normalize_ref(track).primary().to_string();
        let _guard = self.enter(format!("star:{key}")).await;
        Ok(StarConfirmation {
            url: url
                .map(str::to_string)
                .unwrap_or_else(|| format!("https://market.example/{key}")),
            display_title: Some(track.to_string()),
        })
    }

    async fn unstar(&self, url: &str) -> Result<()> {
        let _guard = self.enter(format!("unstar:{url}")).await;
        Ok(())
    }

    async fn favorites(&self) -> Result<Vec<RemoteFavorite>> {
        let _guard = self.enter("favorites".to_string()).await;
        Ok(vec![])
    }

    async fn download(&self, track: &TrackRef, _url: &str, dest: &Path) -> Result<PathBuf> {
        let key = keys::normalize_ref(track).primary().to_string();
        let _guard = self.enter(format!("download:{key}")).await;
        Ok(dest.join(format!("{key}.mp3")))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Store whose folder load blocks until released, pinning a rescan job in
/// the single-flight slot for as long as a test needs.
struct GatedStore {
    inner: MemoryStore,
    gate: Arc<Semaphore>,
}

impl GatedStore {
    fn new(gate: Arc<Semaphore>) -> Self {
        Self {
            inner: MemoryStore::new(),
            gate,
        }
    }
}

#[async_trait]
impl FlagStore for GatedStore {
    async fn load_tracks(&self) -> Result<Vec<Track>> {
        self.inner.load_tracks().await
    }

    async fn save_track(&self, track: &Track) -> Result<()> {
        self.inner.save_track(track).await
    }

    async fn load_folders(&self) -> Result<Vec<Folder>> {
        let _permit = self.gate.acquire().await;
        self.inner.load_folders().await
    }

    async fn save_folder_stats(&self, stats: &FolderStats) -> Result<()> {
        self.inner.save_folder_stats(stats).await
    }
}

async fn wait_idle(engine: &SyncEngine) {
    for _ in 0..500 {
        let progress = engine.progress();
        let queues = engine.status().await.queues;
        if !progress.running
            && engine.running_kind().is_none()
            && queues.entries.is_empty()
            && queues.batch.is_empty()
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("engine did not go idle in time");
}

fn track_a() -> TrackRef {
    TrackRef::new("Bicep", "Glue")
}

fn track_b() -> TrackRef {
    TrackRef::new("Overmono", "So U Kno")
}

fn track_c() -> TrackRef {
    TrackRef::new("Burial", "Archangel")
}

async fn engine_with(operator: MockOperator, store: impl FlagStore + 'static) -> SyncEngine {
    SyncEngineBuilder::new()
        .operator(operator)
        .store(store)
        .build()
        .await
        .expect("engine builds")
}

async fn seed_recognized(engine: &SyncEngine, tracks: &[TrackRef]) {
    let entries = tracks.iter().map(|t| (t.clone(), Utc::now())).collect();
    engine.import_recognized(entries).await;
}

#[tokio::test]
async fn duplicate_star_during_rescan_runs_exactly_once() {
    let gate = Arc::new(Semaphore::new(0));
    let operator = MockOperator::new();
    let engine = engine_with(operator.clone(), GatedStore::new(Arc::clone(&gate))).await;
    seed_recognized(&engine, &[track_a()]).await;

    // Rescan grabs the slot and blocks on the gated folder load.
    assert!(matches!(engine.rescan(None), Admission::Accepted { .. }));

    let first = engine.star(track_a()).await.unwrap();
    let second = engine.star(track_a()).await.unwrap();
    assert_eq!(first, Admission::Queued);
    assert_eq!(second, Admission::Queued);

    // Exactly one queue entry for the coalesced pair.
    let queues = engine.status().await.queues;
    let starred_keys = queues.entries.get(&QueueKind::Star).unwrap();
    assert_eq!(starred_keys.len(), 1);

    gate.add_permits(1);
    wait_idle(&engine).await;

    assert_eq!(operator.count_calls("star:"), 1);
}

#[tokio::test]
async fn at_most_one_job_runs_at_any_instant() {
    let operator = MockOperator::new();
    let engine = engine_with(operator.clone(), MemoryStore::new()).await;
    seed_recognized(&engine, &[track_a(), track_b(), track_c()]).await;

    let admissions = vec![
        engine.search_one(track_a()).await.unwrap(),
        engine.search_one(track_b()).await.unwrap(),
        engine.search_one(track_c()).await.unwrap(),
        engine.star(track_a()).await.unwrap(),
        engine.sync_favorites(),
    ];
    assert!(admissions
        .iter()
        .any(|a| matches!(a, Admission::Accepted { .. })));

    wait_idle(&engine).await;
    assert_eq!(operator.max_concurrency(), 1);
}

#[tokio::test]
async fn drain_order_is_star_before_search_before_download() {
    let gate = Arc::new(Semaphore::new(0));
    let operator = MockOperator::new();
    let engine = engine_with(operator.clone(), GatedStore::new(Arc::clone(&gate))).await;
    seed_recognized(&engine, &[track_a(), track_b(), track_c()]).await;

    assert!(matches!(engine.rescan(None), Admission::Accepted { .. }));

    // Queue search A, search B, then star C; C must still run first.
    assert_eq!(engine.search_one(track_a()).await.unwrap(), Admission::Queued);
    assert_eq!(engine.search_one(track_b()).await.unwrap(), Admission::Queued);
    assert_eq!(engine.star(track_c()).await.unwrap(), Admission::Queued);

    gate.add_permits(1);
    wait_idle(&engine).await;

    let calls = operator.calls();
    let star_pos = calls.iter().position(|c| c.starts_with("star:")).unwrap();
    let first_search = calls.iter().position(|c| c.starts_with("search:")).unwrap();
    assert!(star_pos < first_search, "star must drain before search: {calls:?}");

    // FIFO within the search queue.
    let search_calls: Vec<_> = calls.iter().filter(|c| c.starts_with("search:")).collect();
    assert_eq!(search_calls[0], "search:bicep|glue");
    assert_eq!(search_calls[1], "search:overmono|so u kno");
}

#[tokio::test]
async fn withdrawn_queue_entry_never_runs() {
    let gate = Arc::new(Semaphore::new(0));
    let operator = MockOperator::new();
    let engine = engine_with(operator.clone(), GatedStore::new(Arc::clone(&gate))).await;
    seed_recognized(&engine, &[track_a(), track_b()]).await;

    assert!(matches!(engine.rescan(None), Admission::Accepted { .. }));
    assert_eq!(engine.search_one(track_a()).await.unwrap(), Admission::Queued);
    assert_eq!(engine.search_one(track_b()).await.unwrap(), Admission::Queued);

    assert!(engine.remove_from_queue(QueueKind::Search, &track_a()));

    gate.add_permits(1);
    wait_idle(&engine).await;

    assert_eq!(operator.count_calls("search:bicep|glue"), 0);
    assert_eq!(operator.count_calls("search:overmono|so u kno"), 1);
}

#[tokio::test]
async fn search_negative_sets_not_found_and_reset_clears_it() {
    let operator = MockOperator::new();
    operator.mark_not_found(&track_a());
    let engine = engine_with(operator.clone(), MemoryStore::new()).await;
    seed_recognized(&engine, &[track_a()]).await;

    engine.search_one(track_a()).await.unwrap();
    wait_idle(&engine).await;

    let status = engine.status().await;
    assert!(status.not_found.contains_key("bicep|glue"));
    let progress = engine.progress();
    assert_eq!(progress.outcome, Some(JobOutcome::Done));
    assert!(progress.not_found.contains_key("bicep|glue"));

    let cleared = engine.reset_not_found().await;
    assert_eq!(cleared, 1);
    let status = engine.status().await;
    assert!(status.not_found.is_empty());
    // Nothing else moved.
    assert!(status.starred.is_empty());
    assert!(status.have.is_empty());
}

#[tokio::test]
async fn dismiss_undismiss_round_trip_restores_starred() {
    let operator = MockOperator::new();
    let store = MemoryStore::new();

    // Persisted favorite with a stable marketplace URL.
    let mut seeded = Track::new("Bicep", "Glue");
    seeded.marketplace_url = Some("https://market.example/bicep-glue".to_string());
    seeded.starred = true;
    store.save_track(&seeded).await.unwrap();

    let engine = engine_with(operator.clone(), store).await;

    engine.dismiss(track_a()).await.unwrap();
    wait_idle(&engine).await;

    let status = engine.status().await;
    assert!(status.dismissed.contains_key("bicep|glue"));
    assert!(status.starred.is_empty());

    let (updated, admission) = engine.undismiss(track_a()).await.unwrap();
    assert!(!updated.dismissed);
    assert!(admission.is_some());
    wait_idle(&engine).await;

    let status = engine.status().await;
    assert!(status.dismissed.is_empty());
    assert!(status.starred.contains_key("bicep|glue"));
    assert_eq!(operator.count_calls("unstar:"), 1);
    assert_eq!(operator.count_calls("star:"), 1);
}

#[tokio::test]
async fn optimistic_marks_converge_after_completion() {
    let gate = Arc::new(Semaphore::new(0));
    let operator = MockOperator::new();
    let engine = engine_with(operator.clone(), GatedStore::new(Arc::clone(&gate))).await;
    seed_recognized(&engine, &[track_a()]).await;

    let mut pending = PendingSet::new();

    assert!(matches!(engine.rescan(None), Admission::Accepted { .. }));
    pending.mark(&track_a());
    engine.star(track_a()).await.unwrap();

    // Queued behind the rescan: the optimistic mark must survive polls.
    pending.reconcile(&engine.progress(), &engine.status().await);
    assert!(pending.is_pending(&track_a()));

    gate.add_permits(1);
    wait_idle(&engine).await;

    // running=false and the queues are drained: the next poll clears it.
    pending.reconcile(&engine.progress(), &engine.status().await);
    assert!(pending.is_empty());
}

#[tokio::test]
async fn stop_is_terminal_stopped_not_error() {
    let gate = Arc::new(Semaphore::new(0));
    let operator = MockOperator::new();
    let engine = engine_with(operator.clone(), GatedStore::new(Arc::clone(&gate))).await;

    assert!(matches!(engine.rescan(None), Admission::Accepted { .. }));
    assert!(engine.stop());
    gate.add_permits(1);
    wait_idle(&engine).await;

    let progress = engine.progress();
    assert_eq!(progress.outcome, Some(JobOutcome::Stopped));
    assert!(progress.error.is_none());
}

#[tokio::test]
async fn search_all_scopes_new_and_unfound() {
    let operator = MockOperator::new();
    operator.mark_not_found(&track_b());
    let engine = engine_with(operator.clone(), MemoryStore::new()).await;
    seed_recognized(&engine, &[track_a(), track_b()]).await;

    engine.search_all(SearchScope::New);
    wait_idle(&engine).await;
    assert_eq!(operator.count_calls("search:"), 2);

    // Only the unfound track is retried.
    engine.search_all(SearchScope::Unfound);
    wait_idle(&engine).await;
    assert_eq!(operator.count_calls("search:overmono|so u kno"), 2);
    assert_eq!(operator.count_calls("search:bicep|glue"), 1);
}

#[tokio::test]
async fn download_resolves_track_locally() {
    let operator = MockOperator::new();
    let engine = engine_with(operator.clone(), MemoryStore::new()).await;
    seed_recognized(&engine, &[track_a()]).await;

    engine.search_one(track_a()).await.unwrap();
    wait_idle(&engine).await;

    engine.download(track_a()).await.unwrap();
    wait_idle(&engine).await;

    let status = engine.status().await;
    assert_eq!(status.have.len(), 1);
    assert!(status.to_download.is_empty());
    assert_eq!(operator.count_calls("download:"), 1);
}

#[tokio::test]
async fn download_requires_a_resolved_remote_track() {
    let operator = MockOperator::new();
    let engine = engine_with(operator.clone(), MemoryStore::new()).await;
    seed_recognized(&engine, &[track_a()]).await;

    let err = engine.download(track_a()).await.unwrap_err();
    assert!(matches!(err, beatshelf::error::EngineError::MissingUrl));
}
