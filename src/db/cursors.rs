//! Backlog device registrations and per-device read positions.

use super::DbError;
use sqlx::SqlitePool;

pub struct CursorRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CursorRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Record that `device` has attached. Returns `true` if it was new.
    pub async fn register_device(&self, network_user_id: i64, device: &str) -> Result<bool, DbError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO backlog_devices (network_user_id, device, created_at) VALUES (?, ?, ?)",
        )
        .bind(network_user_id)
        .bind(device)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The device's UTC offset in seconds, if one was set.
    pub async fn utc_offset(&self, network_user_id: i64, device: &str) -> Result<Option<i32>, DbError> {
        let offset = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT utc_offset FROM backlog_devices WHERE network_user_id = ? AND device = ?",
        )
        .bind(network_user_id)
        .bind(device)
        .fetch_optional(self.pool)
        .await?;
        Ok(offset.flatten().and_then(|o| i32::try_from(o).ok()))
    }

    /// Set or clear the device's UTC offset, registering the device if needed.
    pub async fn set_utc_offset(
        &self,
        network_user_id: i64,
        device: &str,
        offset: Option<i32>,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO backlog_devices (network_user_id, device, created_at, utc_offset)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(network_user_id, device) DO UPDATE SET utc_offset = excluded.utc_offset
            "#,
        )
        .bind(network_user_id)
        .bind(device)
        .bind(chrono::Utc::now().timestamp())
        .bind(offset)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn position(
        &self,
        network_user_id: i64,
        device: &str,
        context: &str,
    ) -> Result<Option<u64>, DbError> {
        let pos = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT position FROM backlog_positions
            WHERE network_user_id = ? AND device = ? AND context = ?
            "#,
        )
        .bind(network_user_id)
        .bind(device)
        .bind(context)
        .fetch_optional(self.pool)
        .await?;
        Ok(pos.map(|p| u64::try_from(p).unwrap_or(0)))
    }

    pub async fn set_position(
        &self,
        network_user_id: i64,
        device: &str,
        context: &str,
        position: u64,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO backlog_positions (network_user_id, device, context, position)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(network_user_id, device, context) DO UPDATE SET position = excluded.position
            "#,
        )
        .bind(network_user_id)
        .bind(device)
        .bind(context)
        .bind(i64::try_from(position).unwrap_or(i64::MAX))
        .execute(self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{Role, test_db};

    #[tokio::test]
    async fn test_devices_and_positions() {
        let db = test_db().await;
        let user = db.users().create("dave", None, Role::User).await.unwrap();
        let net = db.networks().create(Some(user.id), "net", &[]).await.unwrap();
        let nu = db.network_users().create(user.id, net.id, None).await.unwrap();

        assert!(db.cursors().register_device(nu.id, "phone").await.unwrap());
        assert!(!db.cursors().register_device(nu.id, "phone").await.unwrap());

        assert_eq!(db.cursors().position(nu.id, "phone", "#r").await.unwrap(), None);
        db.cursors().set_position(nu.id, "phone", "#r", 42).await.unwrap();
        db.cursors().set_position(nu.id, "phone", "#r", 84).await.unwrap();
        assert_eq!(db.cursors().position(nu.id, "phone", "#r").await.unwrap(), Some(84));
        assert_eq!(db.cursors().position(nu.id, "laptop", "#r").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_utc_offsets() {
        let db = test_db().await;
        let user = db.users().create("erin", None, Role::User).await.unwrap();
        let net = db.networks().create(Some(user.id), "net", &[]).await.unwrap();
        let nu = db.network_users().create(user.id, net.id, None).await.unwrap();

        assert_eq!(db.cursors().utc_offset(nu.id, "phone").await.unwrap(), None);
        db.cursors().set_utc_offset(nu.id, "phone", Some(-18000)).await.unwrap();
        assert_eq!(db.cursors().utc_offset(nu.id, "phone").await.unwrap(), Some(-18000));
        // Setting an offset registers the device.
        assert!(!db.cursors().register_device(nu.id, "phone").await.unwrap());

        db.cursors().set_utc_offset(nu.id, "phone", None).await.unwrap();
        assert_eq!(db.cursors().utc_offset(nu.id, "phone").await.unwrap(), None);
    }
}
