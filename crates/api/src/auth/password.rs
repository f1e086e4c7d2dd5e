//! Account passwords, stored as Argon2id PHC strings.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use taskmaster_core::user::User;

use crate::error::AppError;

/// Salted Argon2id hash of a new account's password.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::InternalError(format!("Password hashing error: {e}")))
}

/// Whether `password` matches the hash stored on `user`.
///
/// A stored hash that cannot be parsed never matches; it is logged so the
/// damaged record can be repaired.
pub fn password_matches(user: &User, password: &str) -> bool {
    let stored = match PasswordHash::new(&user.password_hash) {
        Ok(stored) => stored,
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Stored password hash is unusable");
            return false;
        }
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &stored)
        .is_ok()
}
