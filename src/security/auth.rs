//! Pluggable credential verification.

use async_trait::async_trait;

use super::SecureString;
use crate::db::{Database, DbError, User};

/// Decides whether a username/password pair names a valid account.
///
/// PASS and every SASL mechanism funnel into this, so swapping the strategy
/// (LDAP, a fixed admin, ...) never touches the connection state machine.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        username: &str,
        password: &SecureString,
    ) -> Result<Option<User>, DbError>;
}

/// Checks against the salted Argon2 hash in the `users` table.
pub struct StoredPasswordAuthenticator {
    db: Database,
}

impl StoredPasswordAuthenticator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Authenticator for StoredPasswordAuthenticator {
    async fn authenticate(
        &self,
        username: &str,
        password: &SecureString,
    ) -> Result<Option<User>, DbError> {
        if password.is_empty() {
            return Ok(None);
        }
        self.db.users().verify(username, password.as_str()).await
    }
}
