//! Account/network pairings. Each pairing is one bouncer session.

use super::{DbError, split_lines, unique_or};
use sqlx::SqlitePool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkUser {
    pub id: i64,
    pub user_id: i64,
    pub network_id: i64,
    /// Preferred nick; the account name is used when unset.
    pub nick: Option<String>,
    pub at_connect: Vec<String>,
}

type NetworkUserRow = (i64, i64, i64, Option<String>, String);

fn from_row((id, user_id, network_id, nick, at_connect): NetworkUserRow) -> NetworkUser {
    NetworkUser {
        id,
        user_id,
        network_id,
        nick,
        at_connect: split_lines(&at_connect),
    }
}

pub struct NetworkUserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> NetworkUserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: i64,
        network_id: i64,
        nick: Option<&str>,
    ) -> Result<NetworkUser, DbError> {
        let result =
            sqlx::query("INSERT INTO network_users (user_id, network_id, nick) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(network_id)
                .bind(nick)
                .execute(self.pool)
                .await
                .map_err(|e| {
                    unique_or(e, || {
                        DbError::NetworkExists(format!("user {user_id} network {network_id}"))
                    })
                })?;

        Ok(NetworkUser {
            id: result.last_insert_rowid(),
            user_id,
            network_id,
            nick: nick.map(str::to_owned),
            at_connect: Vec::new(),
        })
    }

    pub async fn find(&self, user_id: i64, network_id: i64) -> Result<Option<NetworkUser>, DbError> {
        let row = sqlx::query_as::<_, NetworkUserRow>(
            r#"
            SELECT id, user_id, network_id, nick, at_connect FROM network_users
            WHERE user_id = ? AND network_id = ?
            "#,
        )
        .bind(user_id)
        .bind(network_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    pub async fn list(&self) -> Result<Vec<NetworkUser>, DbError> {
        let rows = sqlx::query_as::<_, NetworkUserRow>(
            "SELECT id, user_id, network_id, nick, at_connect FROM network_users ORDER BY id",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    pub async fn list_for_network(&self, network_id: i64) -> Result<Vec<NetworkUser>, DbError> {
        let rows = sqlx::query_as::<_, NetworkUserRow>(
            r#"
            SELECT id, user_id, network_id, nick, at_connect FROM network_users
            WHERE network_id = ? ORDER BY id
            "#,
        )
        .bind(network_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    pub async fn delete(&self, id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM network_users WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
