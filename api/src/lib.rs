use std::sync::Arc;

use beatshelf::SyncEngine;
use sqlx::SqlitePool;

pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod store;

pub use routes::build_router;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    pub pool: SqlitePool,
}

impl AppState {
    pub fn new(engine: Arc<SyncEngine>, pool: SqlitePool) -> Self {
        Self { engine, pool }
    }
}
