use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::job::Admission;
use shared::track::{Track, TrackRef};

use super::ApiError;
use crate::AppState;

#[derive(Deserialize)]
pub struct RecognizedEntry {
    pub artist: String,
    pub title: String,
    #[serde(default)]
    pub recognized_at: Option<DateTime<Utc>>,
}

/// Ingest a batch of the device's recognition history.
pub async fn import_recognized(
    State(state): State<AppState>,
    Json(entries): Json<Vec<RecognizedEntry>>,
) -> Json<Value> {
    let entries = entries
        .into_iter()
        .map(|e| {
            (
                TrackRef::new(e.artist, e.title),
                e.recognized_at.unwrap_or_else(Utc::now),
            )
        })
        .collect();
    let imported = state.engine.import_recognized(entries).await;
    Json(json!({ "imported": imported }))
}

pub async fn skip(
    State(state): State<AppState>,
    Json(track): Json<TrackRef>,
) -> Result<Json<Track>, ApiError> {
    Ok(Json(state.engine.skip(track).await?))
}

pub async fn unskip(
    State(state): State<AppState>,
    Json(track): Json<TrackRef>,
) -> Result<Json<Track>, ApiError> {
    Ok(Json(state.engine.unskip(track).await?))
}

pub async fn dismiss(
    State(state): State<AppState>,
    Json(track): Json<TrackRef>,
) -> Result<Json<Admission>, ApiError> {
    Ok(Json(state.engine.dismiss(track).await?))
}

#[derive(Serialize)]
pub struct UndismissResponse {
    pub track: Track,
    pub admission: Option<Admission>,
}

pub async fn undismiss(
    State(state): State<AppState>,
    Json(track): Json<TrackRef>,
) -> Result<Json<UndismissResponse>, ApiError> {
    let (track, admission) = state.engine.undismiss(track).await?;
    Ok(Json(UndismissResponse { track, admission }))
}

pub async fn clear_dismissed(
    State(state): State<AppState>,
    Json(track): Json<TrackRef>,
) -> Result<Json<Track>, ApiError> {
    Ok(Json(state.engine.clear_dismissed(track).await?))
}

pub async fn reset_not_found(State(state): State<AppState>) -> Json<Value> {
    let cleared = state.engine.reset_not_found().await;
    Json(json!({ "cleared": cleared }))
}
