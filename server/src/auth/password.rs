use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

use crate::utils::AppError;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::InternalServerError(format!("Password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

/// False for a wrong password and for an unparseable stored hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let hash = hash_password("Secret1!").unwrap();
        assert!(verify_password("Secret1!", &hash));
        assert!(!verify_password("Secret2!", &hash));
    }

    #[test]
    fn test_garbage_hash_does_not_verify() {
        assert!(!verify_password("Secret1!", "not-a-hash"));
    }
}
