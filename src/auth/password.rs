use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hashes a password into PHC string form with a fresh random salt.
pub fn hash(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hashed = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("hashing failed: {}", e))?;
    Ok(hashed.to_string())
}

/// Verifies a password against a stored PHC hash. Any malformed stored
/// hash counts as a mismatch.
pub fn verify(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hashed = hash("secret1").unwrap();
        assert!(verify("secret1", &hashed));
        assert!(!verify("secret2", &hashed));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify("secret1", "not-a-phc-string"));
        assert!(!verify("secret1", ""));
    }

    #[test]
    fn salts_are_unique_per_hash() {
        let first = hash("secret1").unwrap();
        let second = hash("secret1").unwrap();
        assert_ne!(first, second);
    }
}
