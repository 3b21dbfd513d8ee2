//! Authentication validator
//!
//! Password hashing and verification with Argon2id. Hashes are PHC strings,
//! so the salt and parameters travel with each hash.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

const MAX_SECRET_LENGTH: usize = 1024;

/// Performs basic input sanitation to check for malicious or malformed usernames/passwords.
pub(crate) fn is_valid_input(input: &str, max_length: usize) -> bool {
    !input.trim().is_empty() && input.len() <= max_length && !input.contains(['\r', '\n', '\0'])
}

/// Hash a secret into an Argon2id PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    if !is_valid_input(password, MAX_SECRET_LENGTH) {
        return Err(password_hash::Error::Password);
    }

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Validates that the provided password matches the stored hash.
///
/// A malformed stored hash never authenticates.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    if !is_valid_input(password, MAX_SECRET_LENGTH) {
        return false;
    }

    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
