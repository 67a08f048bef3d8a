use bcrypt::{hash, verify, BcryptError};

/// Salted one-way hash for storage. The salt is embedded in the output.
pub fn hash_password(password: &str, cost: u32) -> Result<String, BcryptError> {
    hash(password.as_bytes(), cost)
}

/// bcrypt's comparison of the recomputed digest is constant-time.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, BcryptError> {
    verify(password.as_bytes(), stored_hash)
}
