//! Account repository.

use super::{DbError, unique_or};
use crate::security::password::{dummy_password_verify, hash_password, verify_password};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::fmt;

/// Account role. Admins may use the management console commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    fn from_db(value: &str) -> Self {
        if value == "admin" { Self::Admin } else { Self::User }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bouncer account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

type UserRow = (i64, String, String);

fn from_row((id, username, role): UserRow) -> User {
    User {
        id,
        username,
        role: Role::from_db(&role),
    }
}

/// Repository for account operations.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an account. Usernames are case-insensitive and stored lowercase.
    pub async fn create(
        &self,
        username: &str,
        password: Option<&str>,
        role: Role,
    ) -> Result<User, DbError> {
        let username = username.to_lowercase();
        let password_hash = password
            .map(hash_password)
            .transpose()
            .map_err(|e| DbError::PasswordHash(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, role, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&username)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool)
        .await
        .map_err(|e| unique_or(e, || DbError::UserExists(username.clone())))?;

        Ok(User {
            id: result.last_insert_rowid(),
            username,
            role,
        })
    }

    pub async fn find_by_name(&self, username: &str) -> Result<Option<User>, DbError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, role FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(from_row))
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, DbError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, username, role FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(from_row))
    }

    pub async fn list(&self) -> Result<Vec<User>, DbError> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT id, username, role FROM users ORDER BY id")
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    /// Check a password, returning the account when it matches.
    ///
    /// Unknown accounts still cost one hash verification so response time
    /// does not reveal whether a username exists.
    pub async fn verify(&self, username: &str, password: &str) -> Result<Option<User>, DbError> {
        let row = sqlx::query_as::<_, (i64, String, String, Option<String>)>(
            "SELECT id, username, role, password_hash FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        let Some((id, username, role, Some(hash))) = row else {
            dummy_password_verify(password);
            return Ok(None);
        };

        if verify_password(password, &hash) {
            Ok(Some(from_row((id, username, role))))
        } else {
            Ok(None)
        }
    }

    pub async fn set_password(&self, id: i64, password: &str) -> Result<(), DbError> {
        let hash = hash_password(password).map_err(|e| DbError::PasswordHash(e.to_string()))?;
        sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(hash)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{DbError, Role, test_db};

    #[tokio::test]
    async fn test_create_and_verify() {
        let db = test_db().await;
        let user = db
            .users()
            .create("Alice", Some("hunter2"), Role::Admin)
            .await
            .unwrap();
        assert_eq!(user.username, "alice");
        assert!(user.is_admin());

        let found = db.users().verify("alice", "hunter2").await.unwrap();
        assert_eq!(found, Some(user.clone()));
        assert_eq!(db.users().verify("alice", "wrong").await.unwrap(), None);
        assert_eq!(db.users().verify("nobody", "hunter2").await.unwrap(), None);
        assert_eq!(db.users().find_by_id(user.id).await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let db = test_db().await;
        db.users().create("bob", None, Role::User).await.unwrap();
        let err = db.users().create("BOB", None, Role::User).await.unwrap_err();
        assert!(matches!(err, DbError::UserExists(name) if name == "bob"));
    }

    #[tokio::test]
    async fn test_account_without_password_never_verifies() {
        let db = test_db().await;
        let user = db.users().create("carol", None, Role::User).await.unwrap();
        assert_eq!(db.users().verify("carol", "").await.unwrap(), None);

        db.users().set_password(user.id, "s3cret").await.unwrap();
        assert!(db.users().verify("carol", "s3cret").await.unwrap().is_some());
    }
}
