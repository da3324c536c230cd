//! Password hashing and verification utilities.

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};

/// Verify a password against a stored Argon2 PHC string. A hash that fails
/// to parse never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is unreadable");
            false
        }
    }
}

/// Hash a password using default Argon2 settings.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    Ok(argon2
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Spend the same work as a real verification when the account is missing.
pub fn dummy_password_verify(password: &str) {
    // Argon2id hash of a random string; it never matches.
    const DUMMY_HASH: &str =
        "$argon2id$v=19$m=19456,t=2,p=1$c2xibmMtZHVtbXktc2FsdA$6qGkXo1s4yUqZbXkQm0vKQ0Ck3b9yV7mS2dC8kU7p2E";

    if let Ok(parsed) = PasswordHash::new(DUMMY_HASH) {
        let _ = Argon2::default().verify_password(password.as_bytes(), &parsed);
    }
}
