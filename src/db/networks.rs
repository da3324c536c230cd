//! Network and host repository.

use super::{DbError, split_lines, unique_or};
use sqlx::SqlitePool;

/// An IRC network. Networks without an owner are public.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub id: i64,
    pub user_id: Option<i64>,
    pub name: String,
    pub at_connect: Vec<String>,
}

impl Network {
    pub fn is_public(&self) -> bool {
        self.user_id.is_none()
    }
}

/// One upstream server address for a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub id: i64,
    pub network_id: i64,
    pub address: String,
    pub port: u16,
    pub ssl: bool,
}

type NetworkRow = (i64, Option<i64>, String, String);

fn network_from_row((id, user_id, name, at_connect): NetworkRow) -> Network {
    Network {
        id,
        user_id,
        name,
        at_connect: split_lines(&at_connect),
    }
}

/// Repository for networks and their hosts.
pub struct NetworkRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> NetworkRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a network owned by `owner`, or a public one when `owner` is `None`.
    pub async fn create(
        &self,
        owner: Option<i64>,
        name: &str,
        at_connect: &[String],
    ) -> Result<Network, DbError> {
        let result = sqlx::query("INSERT INTO networks (user_id, name, at_connect) VALUES (?, ?, ?)")
            .bind(owner)
            .bind(name)
            .bind(at_connect.join("\n"))
            .execute(self.pool)
            .await
            .map_err(|e| unique_or(e, || DbError::NetworkExists(name.to_string())))?;

        Ok(Network {
            id: result.last_insert_rowid(),
            user_id: owner,
            name: name.to_string(),
            at_connect: at_connect.to_vec(),
        })
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Network>, DbError> {
        let row = sqlx::query_as::<_, NetworkRow>(
            "SELECT id, user_id, name, at_connect FROM networks WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(network_from_row))
    }

    /// Network named `name` visible to `user_id`: their own first, then a
    /// public one.
    pub async fn find_for_user(&self, user_id: i64, name: &str) -> Result<Option<Network>, DbError> {
        let row = sqlx::query_as::<_, NetworkRow>(
            r#"
            SELECT id, user_id, name, at_connect FROM networks
            WHERE name = ? AND (user_id = ? OR user_id IS NULL)
            ORDER BY user_id IS NULL
            LIMIT 1
            "#,
        )
        .bind(name)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(network_from_row))
    }

    pub async fn find_public(&self, name: &str) -> Result<Option<Network>, DbError> {
        let row = sqlx::query_as::<_, NetworkRow>(
            "SELECT id, user_id, name, at_connect FROM networks WHERE name = ? AND user_id IS NULL",
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(network_from_row))
    }

    /// Networks `user_id` can use: their own plus every public one.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Network>, DbError> {
        let rows = sqlx::query_as::<_, NetworkRow>(
            r#"
            SELECT id, user_id, name, at_connect FROM networks
            WHERE user_id = ? OR user_id IS NULL
            ORDER BY name
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(network_from_row).collect())
    }

    pub async fn list(&self) -> Result<Vec<Network>, DbError> {
        let rows = sqlx::query_as::<_, NetworkRow>(
            "SELECT id, user_id, name, at_connect FROM networks ORDER BY name",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(network_from_row).collect())
    }

    /// Delete a network. Hosts, pairings and their rooms go with it.
    pub async fn delete(&self, id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM networks WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn hosts(&self, network_id: i64) -> Result<Vec<Host>, DbError> {
        let rows = sqlx::query_as::<_, (i64, i64, String, i64, bool)>(
            "SELECT id, network_id, address, port, ssl FROM hosts WHERE network_id = ? ORDER BY id",
        )
        .bind(network_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, network_id, address, port, ssl)| {
                Some(Host {
                    id,
                    network_id,
                    address,
                    port: u16::try_from(port).ok()?,
                    ssl,
                })
            })
            .collect())
    }

    pub async fn add_host(
        &self,
        network_id: i64,
        address: &str,
        port: u16,
        ssl: bool,
    ) -> Result<Host, DbError> {
        let result =
            sqlx::query("INSERT INTO hosts (network_id, address, port, ssl) VALUES (?, ?, ?, ?)")
                .bind(network_id)
                .bind(address)
                .bind(i64::from(port))
                .bind(ssl)
                .execute(self.pool)
                .await?;

        Ok(Host {
            id: result.last_insert_rowid(),
            network_id,
            address: address.to_string(),
            port,
            ssl,
        })
    }
}
