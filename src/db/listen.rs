//! Listen address repository.

use super::{DbError, unique_or};
use sqlx::SqlitePool;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddress {
    pub id: i64,
    pub address: String,
    pub port: u16,
    pub ssl: bool,
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)?;
        } else {
            write!(f, "{}:{}", self.address, self.port)?;
        }
        if self.ssl {
            f.write_str(" (ssl)")?;
        }
        Ok(())
    }
}

pub struct ListenRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ListenRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<ListenAddress>, DbError> {
        let rows = sqlx::query_as::<_, (i64, String, i64, bool)>(
            "SELECT id, address, port, ssl FROM listen_addresses ORDER BY id",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(id, address, port, ssl)| {
                Some(ListenAddress {
                    id,
                    address,
                    port: u16::try_from(port).ok()?,
                    ssl,
                })
            })
            .collect())
    }

    pub async fn add(&self, address: &str, port: u16, ssl: bool) -> Result<ListenAddress, DbError> {
        let result = sqlx::query("INSERT INTO listen_addresses (address, port, ssl) VALUES (?, ?, ?)")
            .bind(address)
            .bind(i64::from(port))
            .bind(ssl)
            .execute(self.pool)
            .await
            .map_err(|e| unique_or(e, || DbError::ListenExists(format!("{address}:{port}"))))?;

        Ok(ListenAddress {
            id: result.last_insert_rowid(),
            address: address.to_string(),
            port,
            ssl,
        })
    }

    /// Delete by address and port, returning the removed row.
    pub async fn remove(&self, address: &str, port: u16) -> Result<Option<ListenAddress>, DbError> {
        let row = sqlx::query_as::<_, (i64, bool)>(
            "DELETE FROM listen_addresses WHERE address = ? AND port = ? RETURNING id, ssl",
        )
        .bind(address)
        .bind(i64::from(port))
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(id, ssl)| ListenAddress {
            id,
            address: address.to_string(),
            port,
            ssl,
        }))
    }
}
