use argon2::{
    Algorithm, Argon2, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::RngCore;

use crate::auth::{AuthError, AuthResult};

const SALT_LEN: usize = 16;
const MIN_PASSWORD_LEN: usize = 8;

/// Argon2id password hashing with a configurable memory cost.
///
/// The memory cost is the deployment's work-factor knob: raise it as
/// hardware improves to keep verification latency in the intended range.
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl PasswordService {
    pub fn new(memory_kib: u32) -> AuthResult<Self> {
        let mut builder = ParamsBuilder::new();
        builder.m_cost(memory_kib);
        builder.t_cost(2);
        builder.p_cost(1);
        let params = builder.build().map_err(AuthError::from)?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        Ok(Self { argon2 })
    }

    /// Hash a plaintext password, enforcing the strength policy first.
    ///
    /// A fresh random salt is drawn per call, so hashing the same input
    /// twice yields different encodings.
    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        check_password_policy(password)?;

        let mut salt_bytes = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(AuthError::from)?;
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(AuthError::from)?
            .to_string();
        Ok(hash)
    }

    /// Check a candidate against a stored hash.
    ///
    /// Returns `false` for an empty candidate or a malformed stored hash
    /// rather than erroring; a login attempt must never panic or leak why
    /// the comparison could not run.
    pub fn verify_password(&self, password: &str, encoded: &str) -> bool {
        if password.is_empty() {
            return false;
        }
        let parsed = match PasswordHash::new(encoded) {
            Ok(parsed) => parsed,
            Err(_) => return false,
        };
        self.argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Minimum strength rules applied before any hashing happens.
///
/// Violations name the specific rule: the password being judged is one the
/// user is actively choosing, not one being guessed against an account.
fn check_password_policy(password: &str) -> AuthResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword {
            reason: "must be at least 8 characters",
        });
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(AuthError::WeakPassword {
            reason: "must contain an uppercase letter",
        });
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(AuthError::WeakPassword {
            reason: "must contain a lowercase letter",
        });
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::WeakPassword {
            reason: "must contain a digit",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> PasswordService {
        // Small memory cost keeps the test suite fast.
        PasswordService::new(8 * 1024).expect("password service")
    }

    #[test]
    fn hashes_and_verifies_passwords() {
        let service = service();
        let hash = service.hash_password("Sup3rSecret").expect("hash generation");
        assert!(service.verify_password("Sup3rSecret", &hash));
        assert!(!service.verify_password("Wr0ngPassword", &hash));
    }

    #[test]
    fn salts_make_hashes_non_deterministic() {
        let service = service();
        let first = service.hash_password("Sup3rSecret").expect("first hash");
        let second = service.hash_password("Sup3rSecret").expect("second hash");
        assert_ne!(first, second);
        assert!(service.verify_password("Sup3rSecret", &first));
        assert!(service.verify_password("Sup3rSecret", &second));
    }

    #[test]
    fn rejects_weak_passwords_with_the_violated_rule() {
        let service = service();
        let cases = [
            ("Ab1", "must be at least 8 characters"),
            ("alllower1", "must contain an uppercase letter"),
            ("ALLUPPER1", "must contain a lowercase letter"),
            ("NoDigitsHere", "must contain a digit"),
        ];
        for (password, expected) in cases {
            match service.hash_password(password) {
                Err(AuthError::WeakPassword { reason }) => assert_eq!(reason, expected),
                other => panic!("expected WeakPassword for {password:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn verify_is_false_for_empty_or_malformed_input() {
        let service = service();
        let hash = service.hash_password("Sup3rSecret").expect("hash");
        assert!(!service.verify_password("", &hash));
        assert!(!service.verify_password("Sup3rSecret", "not-a-phc-string"));
        assert!(!service.verify_password("Sup3rSecret", ""));
    }
}
