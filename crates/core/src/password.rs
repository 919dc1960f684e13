//! Password hashing for protected snippets.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::Error;

/// Opaque hash/verify capability used to gate protected snippets.
pub trait PasswordScheme: Send + Sync + std::fmt::Debug {
    /// Hash a password into a self-describing string.
    ///
    /// # Errors
    ///
    /// Returns `Error::Password` if hashing fails.
    fn hash(&self, password: &str) -> Result<String, Error>;

    /// Check `password` against a stored hash. Malformed hashes never verify.
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Argon2id with the crate's default parameters, stored as PHC strings.
#[derive(Debug, Default, Clone)]
pub struct Argon2Scheme {
    params: Option<argon2::Params>,
}

impl Argon2Scheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use explicit cost parameters.
    pub fn with_params(params: argon2::Params) -> Self {
        Self { params: Some(params) }
    }

    fn argon2(&self) -> Argon2<'static> {
        match &self.params {
            Some(params) => Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params.clone()),
            None => Argon2::default(),
        }
    }
}

impl PasswordScheme for Argon2Scheme {
    fn hash(&self, password: &str) -> Result<String, Error> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| Error::Password(e.to_string()))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            tracing::warn!("stored password hash is not a valid PHC string");
            return false;
        };
        self.argon2().verify_password(password.as_bytes(), &parsed).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Argon2Scheme {
        Argon2Scheme::with_params(argon2::Params::new(1024, 1, 1, None).unwrap())
    }

    #[test]
    fn test_hash_then_verify() {
        let scheme = cheap();
        let hash = scheme.hash("secret123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(scheme.verify("secret123", &hash));
        assert!(!scheme.verify("wrongpass", &hash));
    }

    #[test]
    fn test_hashes_are_salted() {
        let scheme = cheap();
        assert_ne!(scheme.hash("same").unwrap(), scheme.hash("same").unwrap());
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!cheap().verify("anything", "not-a-phc-string"));
    }
}
