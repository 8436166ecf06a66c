use std::sync::Arc;

use anyhow::Result;
use api::config::CONFIG;
use api::store::SqliteStore;
use api::{build_router, db, AppState};
use beatshelf::bridge::BridgeClientBuilder;
use beatshelf::SyncEngineBuilder;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting beatshelf api v{}", env!("CARGO_PKG_VERSION"));

    let pool = db::init_db(CONFIG.database_url()).await?;

    let mut bridge = BridgeClientBuilder::new().base_url(CONFIG.bridge_url());
    if let Some(key) = CONFIG.bridge_api_key() {
        bridge = bridge.api_key(key);
    }
    let bridge = bridge.build()?;

    let engine = SyncEngineBuilder::new()
        .operator(bridge)
        .store(SqliteStore::new(pool.clone()))
        .download_dir(CONFIG.download_path())
        .build()
        .await?;

    let state = AppState::new(Arc::new(engine), pool);
    let app = build_router(state);

    let addr = format!("{}:{}", CONFIG.ip, CONFIG.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("beatshelf api listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
