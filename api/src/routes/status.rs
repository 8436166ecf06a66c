use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use shared::progress::Progress;
use shared::status::StatusSnapshot;

use crate::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let bridge = state.engine.operator_healthy().await;
    Json(json!({ "status": "ok", "bridge": bridge }))
}

pub async fn get_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.engine.status().await)
}

pub async fn get_progress(State(state): State<AppState>) -> Json<Progress> {
    Json(state.engine.progress())
}
