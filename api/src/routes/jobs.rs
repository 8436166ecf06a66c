use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use shared::job::{Admission, QueueKind, SearchScope};
use shared::status::QueueSnapshot;
use shared::track::TrackRef;

use super::ApiError;
use crate::AppState;

#[derive(Deserialize)]
pub struct RescanRequest {
    #[serde(default)]
    pub folder: Option<String>,
}

pub async fn rescan(
    State(state): State<AppState>,
    Json(req): Json<RescanRequest>,
) -> Json<Admission> {
    Json(state.engine.rescan(req.folder))
}

pub async fn search_one(
    State(state): State<AppState>,
    Json(track): Json<TrackRef>,
) -> Result<Json<Admission>, ApiError> {
    Ok(Json(state.engine.search_one(track).await?))
}

#[derive(Deserialize)]
pub struct SearchAllRequest {
    pub mode: SearchScope,
}

pub async fn search_all(
    State(state): State<AppState>,
    Json(req): Json<SearchAllRequest>,
) -> Json<Admission> {
    Json(state.engine.search_all(req.mode))
}

pub async fn star(
    State(state): State<AppState>,
    Json(track): Json<TrackRef>,
) -> Result<Json<Admission>, ApiError> {
    Ok(Json(state.engine.star(track).await?))
}

pub async fn unstar(
    State(state): State<AppState>,
    Json(track): Json<TrackRef>,
) -> Result<Json<Admission>, ApiError> {
    Ok(Json(state.engine.unstar(track).await?))
}

pub async fn star_batch(
    State(state): State<AppState>,
    Json(tracks): Json<Vec<TrackRef>>,
) -> Json<Admission> {
    Json(state.engine.star_batch(tracks))
}

pub async fn sync_favorites(State(state): State<AppState>) -> Json<Admission> {
    Json(state.engine.sync_favorites())
}

pub async fn download(
    State(state): State<AppState>,
    Json(track): Json<TrackRef>,
) -> Result<Json<Admission>, ApiError> {
    Ok(Json(state.engine.download(track).await?))
}

pub async fn download_batch(
    State(state): State<AppState>,
    Json(tracks): Json<Vec<TrackRef>>,
) -> Json<Vec<Admission>> {
    Json(state.engine.download_queue(tracks).await)
}

#[derive(Deserialize)]
pub struct RemoveFromQueueRequest {
    pub kind: QueueKind,
    pub track: TrackRef,
}

pub async fn remove_from_queue(
    State(state): State<AppState>,
    Json(req): Json<RemoveFromQueueRequest>,
) -> Json<QueueSnapshot> {
    state.engine.remove_from_queue(req.kind, &req.track);
    Json(state.engine.status().await.queues)
}

pub async fn stop(State(state): State<AppState>) -> Json<Value> {
    let stopped = state.engine.stop();
    Json(json!({ "stopped": stopped }))
}
