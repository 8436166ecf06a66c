use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

/// Connect to the configured database, creating the sqlite file if needed,
/// and run pending migrations.
pub async fn init_db(database_url: &str) -> anyhow::Result<SqlitePool> {
    if database_url.starts_with("sqlite:") {
        let path_str = database_url.trim_start_matches("sqlite:");
        let path = std::path::Path::new(path_str);
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(path)?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", database_url);
    Ok(pool)
}
