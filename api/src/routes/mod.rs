use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use beatshelf::error::EngineError;
use serde_json::json;

use crate::AppState;

pub mod folders;
pub mod jobs;
pub mod status;
pub mod tracks;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(status::health))
        .route("/api/status", get(status::get_status))
        .route("/api/progress", get(status::get_progress))
        .route("/api/recognized", post(tracks::import_recognized))
        .route("/api/jobs/rescan", post(jobs::rescan))
        .route("/api/jobs/search", post(jobs::search_one))
        .route("/api/jobs/search-all", post(jobs::search_all))
        .route("/api/jobs/star", post(jobs::star).delete(jobs::unstar))
        .route("/api/jobs/star-batch", post(jobs::star_batch))
        .route("/api/jobs/sync-favorites", post(jobs::sync_favorites))
        .route("/api/jobs/download", post(jobs::download))
        .route("/api/jobs/download-batch", post(jobs::download_batch))
        .route("/api/jobs/stop", post(jobs::stop))
        .route("/api/queue", delete(jobs::remove_from_queue))
        .route("/api/tracks/skip", post(tracks::skip))
        .route("/api/tracks/unskip", post(tracks::unskip))
        .route("/api/tracks/dismiss", post(tracks::dismiss))
        .route("/api/tracks/undismiss", post(tracks::undismiss))
        .route("/api/tracks/clear-dismissed", post(tracks::clear_dismissed))
        .route("/api/tracks/reset-not-found", post(tracks::reset_not_found))
        .route(
            "/api/folders",
            get(folders::list)
                .post(folders::create)
                .put(folders::update)
                .delete(folders::remove),
        )
        .with_state(state)
}

/// Engine errors mapped onto the HTTP surface. Busy never reaches here
/// under the queue-and-notify policy; invalid transitions and missing URLs
/// are caller mistakes, not server faults.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::UnknownTrack => StatusCode::NOT_FOUND,
            EngineError::InvalidTransition { .. }
            | EngineError::MissingUrl
            | EngineError::Busy { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn server_error<E: std::fmt::Display>(e: E) -> ApiError {
    ApiError(EngineError::Store(e.to_string()))
}
