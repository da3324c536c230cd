//! Key/value settings.

use super::DbError;
use sqlx::SqlitePool;

pub struct SettingsRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SettingsRepository<'a> {
    /// Whether unknown usernames may sign up by connecting.
    pub const USER_REGISTRATION: &'static str = "user_registration";

    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, name: &str) -> Result<Option<String>, DbError> {
        Ok(
            sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE name = ?")
                .bind(name)
                .fetch_optional(self.pool)
                .await?,
        )
    }

    pub async fn set(&self, name: &str, value: &str) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO settings (name, value) VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(name)
        .bind(value)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Store `value` only if the setting has never been written.
    pub async fn set_default(&self, name: &str, value: &str) -> Result<(), DbError> {
        sqlx::query("INSERT OR IGNORE INTO settings (name, value) VALUES (?, ?)")
            .bind(name)
            .bind(value)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
