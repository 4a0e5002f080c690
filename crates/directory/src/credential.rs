//! Local credential placeholders for federated users.
//!
//! Federated users never authenticate against the local file, but every line
//! still carries a password hash. Registration stores the Argon2id hash of a
//! random secret that is thrown away immediately.

use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString},
};
use rand::{Rng, distributions::Alphanumeric, rngs::OsRng};

use fedsync_core::{DirectoryError, DirectoryResult};

/// Length of the discarded random secret.
pub const SECRET_LENGTH: usize = 32;

/// Generate a fresh placeholder hash (PHC string, never contains `:`).
pub fn generate_placeholder() -> DirectoryResult<String> {
    let secret: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LENGTH)
        .map(char::from)
        .collect();

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| DirectoryError::Credential(format!("password hashing failed: {e}")))?;

    Ok(hash.to_string())
}
