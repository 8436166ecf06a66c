//! Job execution.
//!
//! One invocation of [`execute`] owns the single-flight slot from start to
//! terminal state. Units of remote work run FIFO; the cancellation token is
//! checked between units, never mid-unit. Errors stay on the progress
//! record: nothing here propagates across the scheduler boundary.

use std::path::PathBuf;
use std::sync::Arc;

use shared::job::{JobKind, SearchScope};
use shared::progress::JobOutcome;
use shared::status::FolderStats;
use shared::track::{Track, TrackRef, TrackState};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::compare;
use crate::inventory::Inventory;
use crate::keys;
use crate::operator::{RemoteOperator, SearchHit, SearchOutcome};
use crate::progress::ProgressChannel;
use crate::scheduler::JobSpec;
use crate::store::FlagStore;

/// Everything a job needs to run: the operator, the two shared records and
/// the write-through store.
#[derive(Clone)]
pub struct RunnerContext {
    pub operator: Arc<dyn RemoteOperator>,
    pub inventory: Arc<RwLock<Inventory>>,
    pub progress: ProgressChannel,
    pub store: Arc<dyn FlagStore>,
    pub download_dir: PathBuf,
}

fn primary(track: &TrackRef) -> String {
    keys::normalize_ref(track).primary().to_string()
}

async fn persist(ctx: &RunnerContext, tracks: &[Track]) {
    for track in tracks {
        if let Err(e) = ctx.store.save_track(track).await {
            warn!("Failed to persist '{} - {}': {}", track.artist, track.title, e);
        }
    }
}

pub async fn execute(ctx: &RunnerContext, spec: JobSpec, job_id: Uuid, token: CancellationToken) {
    let kind = spec.kind();
    let outcome = match spec {
        JobSpec::SearchOne(track) => run_search(ctx, vec![track], kind, &token).await,
        JobSpec::SearchAll(scope) => {
            let set = search_working_set(ctx, scope).await;
            run_search(ctx, set, kind, &token).await
        }
        JobSpec::StarOne(track) => run_star(ctx, vec![track], kind, &token).await,
        JobSpec::StarBatch(tracks) => run_star(ctx, tracks, kind, &token).await,
        JobSpec::UnstarOne { track, dismiss } => run_unstar(ctx, track, dismiss, &token).await,
        JobSpec::SyncFavorites => run_sync_favorites(ctx, &token).await,
        JobSpec::Download(track) => run_download(ctx, track, &token).await,
        JobSpec::Rescan(folder) => run_rescan(ctx, folder, &token).await,
    };
    info!(job = %job_id, "{} job finished: {:?}", kind, outcome);
}

/// Terminal outcome from unit counters: `Failed` is reserved for a job
/// that achieved nothing, per-unit errors otherwise stay on the failed
/// count with outcome `Done`.
fn outcome_from(stopped: bool, attempted: u64, succeeded: u64) -> JobOutcome {
    if stopped {
        JobOutcome::Stopped
    } else if attempted > 0 && succeeded == 0 {
        JobOutcome::Failed
    } else {
        JobOutcome::Done
    }
}

async fn search_working_set(ctx: &RunnerContext, scope: SearchScope) -> Vec<TrackRef> {
    let inv = ctx.inventory.read().await;
    inv.tracks()
        .iter()
        .filter(|t| !matches!(t.state(), TrackState::Have | TrackState::Skipped | TrackState::Dismissed))
        .filter(|t| match scope {
            SearchScope::New => t.marketplace_url.is_none() && !t.searched_not_found,
            SearchScope::Unfound => t.searched_not_found,
        })
        .map(Track::track_ref)
        .collect()
}

async fn run_search(
    ctx: &RunnerContext,
    tracks: Vec<TrackRef>,
    kind: JobKind,
    token: &CancellationToken,
) -> JobOutcome {
    let first_key = tracks.first().map(primary);
    ctx.progress
        .begin(kind, Some(tracks.len() as u64), first_key);

    let mut results: Vec<(TrackRef, SearchOutcome)> = Vec::new();
    let mut stopped = false;
    let mut attempted = 0u64;

    for track in tracks {
        if token.is_cancelled() {
            stopped = true;
            break;
        }
        attempted += 1;
        let key = primary(&track);
        ctx.progress.set_current_key(Some(&key));

        match ctx.operator.search(&track).await {
            Ok(SearchOutcome::Found(hit)) => {
                ctx.progress.note_url(&key, &hit.url);
                ctx.progress.note_display_title(&key, &hit.display_title);
                ctx.progress.note_match_score(&key, hit.match_score);
                results.push((track.clone(), SearchOutcome::Found(hit)));
            }
            Ok(SearchOutcome::NotFound) => {
                ctx.progress.note_not_found(&key);
                results.push((track.clone(), SearchOutcome::NotFound));
            }
            Err(e) => {
                warn!("Search for '{}' failed: {}", track, e);
                ctx.progress.record_failure(e.to_string());
            }
        }
        ctx.progress
            .advance(Some(&key), format!("Searched '{}'", track));
    }

    let succeeded = results.len() as u64;
    let changed = merge_search_results(ctx, &results).await;
    persist(ctx, &changed).await;

    let outcome = outcome_from(stopped, attempted, succeeded);
    ctx.progress.finish(
        outcome,
        format!("Search finished: {} of {} resolved", count_hits(&results), attempted),
    );
    outcome
}

fn count_hits(results: &[(TrackRef, SearchOutcome)]) -> usize {
    results
        .iter()
        .filter(|(_, o)| matches!(o, SearchOutcome::Found(_)))
        .count()
}

async fn merge_search_results(
    ctx: &RunnerContext,
    results: &[(TrackRef, SearchOutcome)],
) -> Vec<Track> {
    let mut inv = ctx.inventory.write().await;
    let mut changed = Vec::new();
    for (track, outcome) in results {
        let applied = match outcome {
            SearchOutcome::Found(SearchHit {
                url,
                display_title,
                match_score,
            }) => inv.record_search_hit(track, url, display_title, *match_score),
            SearchOutcome::NotFound => inv.record_not_found(track),
        };
        match applied {
            Ok(t) => changed.push(t),
            Err(e) => warn!("Could not merge search result for '{}': {}", track, e),
        }
    }
    changed
}

async fn run_star(
    ctx: &RunnerContext,
    tracks: Vec<TrackRef>,
    kind: JobKind,
    token: &CancellationToken,
) -> JobOutcome {
    let first_key = tracks.first().map(primary);
    ctx.progress
        .begin(kind, Some(tracks.len() as u64), first_key);

    let mut confirmed = Vec::new();
    let mut stopped = false;
    let mut attempted = 0u64;

    for track in tracks {
        if token.is_cancelled() {
            stopped = true;
            break;
        }
        attempted += 1;
        let key = primary(&track);
        ctx.progress.set_current_key(Some(&key));

        let known_url = {
            let inv = ctx.inventory.read().await;
            inv.get(&track).and_then(|t| t.marketplace_url.clone())
        };

        match ctx.operator.star(&track, known_url.as_deref()).await {
            Ok(confirmation) => {
                ctx.progress.note_starred(&key, true);
                ctx.progress.note_url(&key, &confirmation.url);
                if let Some(title) = &confirmation.display_title {
                    ctx.progress.note_display_title(&key, title);
                }
                confirmed.push((track.clone(), confirmation));
            }
            Err(e) => {
                warn!("Star for '{}' failed: {}", track, e);
                ctx.progress.record_failure(e.to_string());
            }
        }
        ctx.progress
            .advance(Some(&key), format!("Starred '{}'", track));
    }

    let succeeded = confirmed.len() as u64;
    let changed = {
        let mut inv = ctx.inventory.write().await;
        let mut changed = Vec::new();
        for (track, confirmation) in &confirmed {
            match inv.confirm_star(
                track,
                Some(&confirmation.url),
                confirmation.display_title.as_deref(),
            ) {
                Ok(t) => changed.push(t),
                Err(e) => warn!("Could not merge star for '{}': {}", track, e),
            }
        }
        changed
    };
    persist(ctx, &changed).await;

    let outcome = outcome_from(stopped, attempted, succeeded);
    ctx.progress
        .finish(outcome, format!("Starred {succeeded} of {attempted}"));
    outcome
}

async fn run_unstar(
    ctx: &RunnerContext,
    track: TrackRef,
    dismiss: bool,
    token: &CancellationToken,
) -> JobOutcome {
    let key = primary(&track);
    ctx.progress
        .begin(JobKind::UnstarOne, Some(1), Some(key.clone()));

    if token.is_cancelled() {
        ctx.progress.finish(JobOutcome::Stopped, "Stopped");
        return JobOutcome::Stopped;
    }

    let known_url = {
        let inv = ctx.inventory.read().await;
        inv.get(&track).and_then(|t| t.marketplace_url.clone())
    };
    let Some(url) = known_url else {
        // Validated at the engine boundary; only a raced withdrawal of the
        // URL can land here.
        ctx.progress
            .record_failure(format!("no marketplace URL for '{}'", track));
        ctx.progress.finish(JobOutcome::Failed, "Unstar failed");
        return JobOutcome::Failed;
    };

    match ctx.operator.unstar(&url).await {
        Ok(()) => {
            ctx.progress.note_starred(&key, false);
            ctx.progress.advance(Some(&key), format!("Unstarred '{}'", track));

            let changed = {
                let mut inv = ctx.inventory.write().await;
                let applied = if dismiss {
                    inv.apply_dismiss(&track)
                } else {
                    inv.confirm_unstar(&track)
                };
                match applied {
                    Ok(t) => vec![t],
                    Err(e) => {
                        warn!("Could not merge unstar for '{}': {}", track, e);
                        Vec::new()
                    }
                }
            };
            persist(ctx, &changed).await;

            let message = if dismiss { "Dismissed" } else { "Unstarred" };
            ctx.progress.finish(JobOutcome::Done, message);
            JobOutcome::Done
        }
        Err(e) => {
            warn!("Unstar for '{}' failed: {}", track, e);
            ctx.progress.record_failure(e.to_string());
            ctx.progress.finish(JobOutcome::Failed, "Unstar failed");
            JobOutcome::Failed
        }
    }
}

async fn run_sync_favorites(ctx: &RunnerContext, token: &CancellationToken) -> JobOutcome {
    ctx.progress.begin(JobKind::SyncFavorites, None, None);
    ctx.progress.set_message("Fetching marketplace favorites");

    let favorites = match ctx.operator.favorites().await {
        Ok(favorites) => favorites,
        Err(e) => {
            warn!("Favorites listing failed: {}", e);
            ctx.progress.record_failure(e.to_string());
            ctx.progress.finish(JobOutcome::Failed, "Favorites sync failed");
            return JobOutcome::Failed;
        }
    };

    ctx.progress
        .set_phase("Merging favorites", Some(favorites.len() as u64));

    let mut merged = Vec::new();
    let mut stopped = false;
    for favorite in &favorites {
        if token.is_cancelled() {
            stopped = true;
            break;
        }
        let track = TrackRef::new(favorite.artist.clone(), favorite.title.clone());
        let key = primary(&track);
        ctx.progress.note_starred(&key, true);
        ctx.progress.note_url(&key, &favorite.url);
        if let Some(title) = &favorite.display_title {
            ctx.progress.note_display_title(&key, title);
        }
        merged.push((track.clone(), favorite));
        ctx.progress.advance(Some(&key), format!("Merged '{}'", track));
    }

    let changed = {
        let mut inv = ctx.inventory.write().await;
        merged
            .iter()
            .map(|(track, favorite)| {
                inv.merge_favorite(track, &favorite.url, favorite.display_title.as_deref())
                    .clone()
            })
            .collect::<Vec<_>>()
    };
    persist(ctx, &changed).await;

    let outcome = if stopped { JobOutcome::Stopped } else { JobOutcome::Done };
    ctx.progress
        .finish(outcome, format!("Merged {} favorites", changed.len()));
    outcome
}

async fn run_download(ctx: &RunnerContext, track: TrackRef, token: &CancellationToken) -> JobOutcome {
    let key = primary(&track);
    ctx.progress
        .begin(JobKind::Download, Some(1), Some(key.clone()));

    if token.is_cancelled() {
        ctx.progress.finish(JobOutcome::Stopped, "Stopped");
        return JobOutcome::Stopped;
    }

    let known_url = {
        let inv = ctx.inventory.read().await;
        inv.get(&track).and_then(|t| t.marketplace_url.clone())
    };
    let Some(url) = known_url else {
        ctx.progress
            .record_failure(format!("no marketplace URL for '{}'", track));
        ctx.progress.finish(JobOutcome::Failed, "Download failed");
        return JobOutcome::Failed;
    };

    match ctx
        .operator
        .download(&track, &url, &ctx.download_dir)
        .await
    {
        Ok(path) => {
            ctx.progress
                .advance(Some(&key), format!("Downloaded '{}'", track));
            let changed = {
                let mut inv = ctx.inventory.write().await;
                vec![inv.attach_local(&track, &path.to_string_lossy()).clone()]
            };
            persist(ctx, &changed).await;
            ctx.progress.finish(JobOutcome::Done, "Download complete");
            JobOutcome::Done
        }
        Err(e) => {
            warn!("Download for '{}' failed: {}", track, e);
            ctx.progress.record_failure(e.to_string());
            ctx.progress.finish(JobOutcome::Failed, "Download failed");
            JobOutcome::Failed
        }
    }
}

async fn run_rescan(
    ctx: &RunnerContext,
    folder_scope: Option<String>,
    token: &CancellationToken,
) -> JobOutcome {
    ctx.progress.begin(JobKind::Rescan, None, None);

    let mut folders = match ctx.store.load_folders().await {
        Ok(folders) => folders,
        Err(e) => {
            warn!("Could not load folder configuration: {}", e);
            ctx.progress.record_failure(e.to_string());
            ctx.progress.finish(JobOutcome::Failed, "Rescan failed");
            return JobOutcome::Failed;
        }
    };
    if let Some(scope) = &folder_scope {
        folders.retain(|f| &f.path == scope || &f.name == scope);
    }

    let scanned = compare::scan_folders(&folders, &ctx.progress, token).await;

    let recognized: Vec<TrackRef> = {
        let inv = ctx.inventory.read().await;
        inv.tracks()
            .iter()
            .filter(|t| t.recognized_at.is_some())
            .map(Track::track_ref)
            .collect()
    };

    let outcome = compare::match_tracks(&recognized, &scanned, &ctx.progress, token);

    let mut stats = outcome.folders;
    for folder in &folders {
        if !stats.iter().any(|s| s.path == folder.path) {
            stats.push(FolderStats {
                path: folder.path.clone(),
                scanned: 0,
                matched: 0,
            });
        }
    }

    let changed = {
        let mut inv = ctx.inventory.write().await;
        let mut changed = Vec::new();
        for (track, path) in &outcome.matches {
            changed.push(inv.attach_local(track, &path.to_string_lossy()).clone());
        }
        for s in &stats {
            inv.set_folder_stats(s.clone());
        }
        changed
    };
    persist(ctx, &changed).await;
    for s in &stats {
        if let Err(e) = ctx.store.save_folder_stats(s).await {
            warn!("Failed to persist scan stats for {}: {}", s.path, e);
        }
    }

    let job_outcome = if token.is_cancelled() {
        JobOutcome::Stopped
    } else {
        JobOutcome::Done
    };
    ctx.progress.finish(
        job_outcome,
        format!(
            "Rescan finished: {} files, {} matched",
            scanned.len(),
            outcome.matches.len()
        ),
    );
    job_outcome
}
