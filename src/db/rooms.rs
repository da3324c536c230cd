//! Rooms a pairing has joined, rejoined on every new upstream link.

use super::DbError;
use sqlx::SqlitePool;

pub struct RoomRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RoomRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, network_user_id: i64) -> Result<Vec<String>, DbError> {
        Ok(sqlx::query_scalar::<_, String>(
            "SELECT name FROM rooms WHERE network_user_id = ? ORDER BY name",
        )
        .bind(network_user_id)
        .fetch_all(self.pool)
        .await?)
    }

    pub async fn add(&self, network_user_id: i64, name: &str) -> Result<(), DbError> {
        sqlx::query("INSERT OR IGNORE INTO rooms (network_user_id, name) VALUES (?, ?)")
            .bind(network_user_id)
            .bind(name)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn remove(&self, network_user_id: i64, name: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM rooms WHERE network_user_id = ? AND name = ?")
            .bind(network_user_id)
            .bind(name)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
