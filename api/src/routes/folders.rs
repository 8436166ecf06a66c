use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{server_error, ApiError};
use crate::models::folder::Folder;
use crate::AppState;

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Folder>>, ApiError> {
    Folder::get_all(&state.pool)
        .await
        .map(Json)
        .map_err(server_error)
}

#[derive(Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
    pub path: String,
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateFolderRequest>,
) -> Result<Json<Folder>, ApiError> {
    if let Err(e) = tokio::fs::create_dir_all(&req.path).await {
        return Err(server_error(format!("Failed to create directory: {}", e)));
    }

    Folder::create(&state.pool, &req.name, &req.path)
        .await
        .map(Json)
        .map_err(server_error)
}

#[derive(Deserialize)]
pub struct UpdateFolderRequest {
    pub id: String,
    pub name: String,
    pub path: String,
}

pub async fn update(
    State(state): State<AppState>,
    Json(req): Json<UpdateFolderRequest>,
) -> Result<Json<Value>, ApiError> {
    Folder::update(&state.pool, &req.id, &req.name, &req.path)
        .await
        .map_err(server_error)?;
    Ok(Json(json!({ "updated": true })))
}

#[derive(Deserialize)]
pub struct DeleteFolderRequest {
    pub id: String,
}

pub async fn remove(
    State(state): State<AppState>,
    Json(req): Json<DeleteFolderRequest>,
) -> Result<Json<Value>, ApiError> {
    Folder::delete(&state.pool, &req.id)
        .await
        .map_err(server_error)?;
    Ok(Json(json!({ "deleted": true })))
}
