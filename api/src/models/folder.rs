use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

/// A configured local music folder with its cached scan results.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Folder {
    pub id: String,
    pub name: String,
    pub path: String,
    pub scanned: i64,
    pub matched: i64,
}

impl Folder {
    pub async fn create(pool: &SqlitePool, name: &str, path: &str) -> Result<Folder, String> {
        let id = Uuid::new_v4().to_string();

        let folder = sqlx::query_as::<_, Folder>(
            "INSERT INTO folders (id, name, path) VALUES (?, ?, ?) RETURNING *",
        )
        .bind(&id)
        .bind(name)
        .bind(path)
        .fetch_one(pool)
        .await
        .map_err(|e| e.to_string())?;

        Ok(folder)
    }

    pub async fn get_all(pool: &SqlitePool) -> Result<Vec<Folder>, String> {
        sqlx::query_as::<_, Folder>("SELECT * FROM folders ORDER BY name")
            .fetch_all(pool)
            .await
            .map_err(|e| e.to_string())
    }

    pub async fn update(
        pool: &SqlitePool,
        id: &str,
        name: &str,
        path: &str,
    ) -> Result<(), String> {
        sqlx::query("UPDATE folders SET name = ?, path = ? WHERE id = ?")
            .bind(name)
            .bind(path)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, id: &str) -> Result<(), String> {
        sqlx::query("DELETE FROM folders WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}
