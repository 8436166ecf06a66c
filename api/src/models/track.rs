use chrono::{DateTime, Utc};
use shared::track::Track;
use sqlx::SqlitePool;

/// Persisted shape of one inventory record.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct TrackRow {
    pub artist: String,
    pub title: String,
    pub recognized_at: Option<DateTime<Utc>>,
    pub local_path: Option<String>,
    pub marketplace_url: Option<String>,
    pub display_title: Option<String>,
    pub match_score: Option<f64>,
    pub starred: bool,
    pub dismissed: bool,
    pub skipped: bool,
    pub searched_not_found: bool,
}

impl From<TrackRow> for Track {
    fn from(row: TrackRow) -> Self {
        Track {
            artist: row.artist,
            title: row.title,
            recognized_at: row.recognized_at,
            local_path: row.local_path,
            marketplace_url: row.marketplace_url,
            display_title: row.display_title,
            match_score: row.match_score,
            starred: row.starred,
            dismissed: row.dismissed,
            skipped: row.skipped,
            searched_not_found: row.searched_not_found,
        }
    }
}

impl TrackRow {
    pub async fn get_all(pool: &SqlitePool) -> Result<Vec<TrackRow>, String> {
        sqlx::query_as::<_, TrackRow>("SELECT * FROM tracks")
            .fetch_all(pool)
            .await
            .map_err(|e| e.to_string())
    }

    /// Write-through upsert keyed by (artist, title).
    pub async fn upsert(pool: &SqlitePool, track: &Track) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO tracks (
                artist, title, recognized_at, local_path, marketplace_url,
                display_title, match_score, starred, dismissed, skipped,
                searched_not_found
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (artist, title) DO UPDATE SET
                recognized_at = excluded.recognized_at,
                local_path = excluded.local_path,
                marketplace_url = excluded.marketplace_url,
                display_title = excluded.display_title,
                match_score = excluded.match_score,
                starred = excluded.starred,
                dismissed = excluded.dismissed,
                skipped = excluded.skipped,
                searched_not_found = excluded.searched_not_found
            "#,
        )
        .bind(&track.artist)
        .bind(&track.title)
        .bind(track.recognized_at)
        .bind(&track.local_path)
        .bind(&track.marketplace_url)
        .bind(&track.display_title)
        .bind(track.match_score)
        .bind(track.starred)
        .bind(track.dismissed)
        .bind(track.skipped)
        .bind(track.searched_not_found)
        .execute(pool)
        .await
        .map_err(|e| e.to_string())?;
        Ok(())
    }
}
