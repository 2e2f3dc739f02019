//! Password hashing and verification
//!
//! Argon2id is the preferred algorithm. If it cannot be used with the
//! configured parameters (rejected params or a failed startup self-test), the
//! hasher falls back to scrypt. Both produce PHC strings, and verification
//! accepts either, so a degraded instance can still check hashes written by a
//! healthy one and vice versa.
//!
//! Passwords longer than the configured maximum are truncated before hashing
//! AND before verification. Callers never need to truncate themselves.

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as PhcHasher, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use scrypt::Scrypt;
use std::fmt;
use tracing::{debug, warn};

use crate::types::{Result, WardenError};

pub const DEFAULT_MAX_PASSWORD_LENGTH: usize = 50;
pub const DEFAULT_WORK_FACTOR: u32 = 3;
pub const DEFAULT_MEMORY_KIB: u32 = Params::DEFAULT_M_COST;

const SCRYPT_MIN_LOG_N: u32 = 10;
const SCRYPT_MAX_LOG_N: u32 = 20;
const SELF_TEST_PASSWORD: &str = "warden-self-test";
// Differs in the first character so it survives any truncation length
const SELF_TEST_WRONG_PASSWORD: &str = "Warden-self-test";

/// Hashing policy loaded from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashPolicy {
    /// Argon2 iterations; scrypt uses `log_n = 10 + work_factor`
    pub work_factor: u32,
    /// Argon2 memory cost in KiB
    pub memory_kib: u32,
    /// Inputs are cut to this many characters
    pub max_password_length: usize,
}

impl Default for HashPolicy {
    fn default() -> Self {
        Self {
            work_factor: DEFAULT_WORK_FACTOR,
            memory_kib: DEFAULT_MEMORY_KIB,
            max_password_length: DEFAULT_MAX_PASSWORD_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Argon2id,
    Scrypt,
}

impl HashAlgorithm {
    /// PHC algorithm identifier
    pub fn ident(&self) -> &'static str {
        match self {
            HashAlgorithm::Argon2id => "argon2id",
            HashAlgorithm::Scrypt => "scrypt",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ident())
    }
}

#[derive(Clone)]
enum Engine {
    Argon2(Argon2<'static>),
    Scrypt(scrypt::Params),
}

/// Password hasher bound to one active algorithm and policy
#[derive(Clone)]
pub struct PasswordHasher {
    engine: Engine,
    policy: HashPolicy,
}

impl fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("algorithm", &self.algorithm())
            .field("policy", &self.policy)
            .finish()
    }
}

impl PasswordHasher {
    /// Create a hasher, preferring Argon2id and degrading to scrypt
    pub fn new(policy: HashPolicy) -> Result<Self> {
        match Self::with_algorithm(HashAlgorithm::Argon2id, policy) {
            Ok(hasher) => Ok(hasher),
            Err(e) => {
                warn!(
                    error = %e,
                    "Argon2id unavailable, falling back to scrypt for password hashing"
                );
                Self::with_algorithm(HashAlgorithm::Scrypt, policy)
            }
        }
    }

    /// Create a hasher for one specific algorithm, without fallback.
    /// Runs the startup self-test.
    pub fn with_algorithm(algorithm: HashAlgorithm, policy: HashPolicy) -> Result<Self> {
        if policy.max_password_length == 0 {
            return Err(WardenError::Config(
                "MAX_PASSWORD_LENGTH must be greater than zero".into(),
            ));
        }

        let engine = match algorithm {
            HashAlgorithm::Argon2id => {
                let params = Params::new(policy.memory_kib, policy.work_factor, 1, None)
                    .map_err(|e| WardenError::Config(format!("Invalid Argon2 parameters: {e}")))?;
                Engine::Argon2(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
            }
            HashAlgorithm::Scrypt => {
                let log_n = scrypt_log_n(policy.work_factor);
                let params = scrypt::Params::new(log_n, 8, 1, scrypt::Params::RECOMMENDED_LEN)
                    .map_err(|e| WardenError::Config(format!("Invalid scrypt parameters: {e}")))?;
                Engine::Scrypt(params)
            }
        };

        let hasher = Self { engine, policy };
        hasher.self_test()?;
        debug!(algorithm = %algorithm, work_factor = policy.work_factor, "Password hasher ready");
        Ok(hasher)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self.engine {
            Engine::Argon2(_) => HashAlgorithm::Argon2id,
            Engine::Scrypt(_) => HashAlgorithm::Scrypt,
        }
    }

    pub fn policy(&self) -> HashPolicy {
        self.policy
    }

    /// Hash a password
    ///
    /// Returns the PHC-formatted hash string that includes the salt and parameters.
    pub fn hash(&self, password: &str) -> Result<String> {
        let password = self.truncate(password);
        let salt = SaltString::generate(&mut OsRng);

        let hash = match &self.engine {
            Engine::Argon2(argon2) => argon2.hash_password(password.as_bytes(), &salt)?,
            Engine::Scrypt(params) => {
                Scrypt.hash_password_customized(password.as_bytes(), None, None, *params, &salt)?
            }
        };
        Ok(hash.to_string())
    }

    /// Verify a password against a stored hash
    ///
    /// Malformed hashes verify as false.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let password = self.truncate(password);
        let parsed = match PasswordHash::new(hash) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "Stored password hash is not a valid PHC string");
                return false;
            }
        };

        let argon2 = Argon2::default();
        let verifiers: [&dyn PasswordVerifier; 2] = [&argon2, &Scrypt];
        parsed.verify_password(&verifiers, password.as_bytes()).is_ok()
    }

    /// Whether a stored hash is weaker than the active policy and should be
    /// replaced on the next successful login
    pub fn needs_rehash(&self, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(p) => p,
            Err(_) => return true,
        };

        if parsed.algorithm.as_str() != self.algorithm().ident() {
            return true;
        }

        let param = |name: &str| parsed.params.get_decimal(name);
        match &self.engine {
            Engine::Argon2(_) => match (param("t"), param("m")) {
                (Some(t_cost), Some(m_cost)) => {
                    t_cost < self.policy.work_factor || m_cost < self.policy.memory_kib
                }
                _ => true,
            },
            Engine::Scrypt(params) => match param("ln") {
                Some(log_n) => log_n < u32::from(params.log_n()),
                None => true,
            },
        }
    }

    /// Cut the input to the configured maximum number of characters
    fn truncate<'a>(&self, password: &'a str) -> &'a str {
        match password.char_indices().nth(self.policy.max_password_length) {
            Some((byte_idx, _)) => &password[..byte_idx],
            None => password,
        }
    }

    fn self_test(&self) -> Result<()> {
        let hash = self.hash(SELF_TEST_PASSWORD)?;
        let accepts = self.verify(SELF_TEST_PASSWORD, &hash);
        let rejects = !self.verify(SELF_TEST_WRONG_PASSWORD, &hash);
        if accepts && rejects {
            Ok(())
        } else {
            Err(WardenError::Internal(format!(
                "{} self-test failed",
                self.algorithm()
            )))
        }
    }
}

fn scrypt_log_n(work_factor: u32) -> u8 {
    // Clamped to [10, 20], so the narrowing cast cannot truncate.
    SCRYPT_MIN_LOG_N.saturating_add(work_factor).clamp(SCRYPT_MIN_LOG_N, SCRYPT_MAX_LOG_N) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Cheap parameters so debug-mode tests stay fast
    fn fast_policy() -> HashPolicy {
        HashPolicy {
            work_factor: 1,
            memory_kib: 1024,
            max_password_length: DEFAULT_MAX_PASSWORD_LENGTH,
        }
    }

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(fast_policy()).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = hasher();
        let password = "correct-horse-battery-staple";
        let hash = hasher.hash(password).unwrap();

        // Hash should be in PHC format
        assert!(hash.starts_with("$argon2id$"));

        assert!(hasher.verify(password, &hash));
        assert!(!hasher.verify("wrong-password", &hash));
    }

    #[test]
    fn test_different_salts() {
        let hasher = hasher();
        let hash1 = hasher.hash("same-password").unwrap();
        let hash2 = hasher.hash("same-password").unwrap();

        assert_ne!(hash1, hash2);
        assert!(hasher.verify("same-password", &hash1));
        assert!(hasher.verify("same-password", &hash2));
    }

    #[test]
    fn test_invalid_hash_format_is_false() {
        let hasher = hasher();
        assert!(!hasher.verify("password", "not-a-valid-hash"));
        assert!(!hasher.verify("password", ""));
        assert!(!hasher.verify("password", "$argon2id$v=19$garbage"));
    }

    #[test]
    fn test_long_passwords_truncated_consistently() {
        let hasher = hasher();
        let base = "a".repeat(DEFAULT_MAX_PASSWORD_LENGTH);
        let hash = hasher.hash(&format!("{base}-suffix-one")).unwrap();

        // Anything sharing the first 50 characters verifies
        assert!(hasher.verify(&base, &hash));
        assert!(hasher.verify(&format!("{base}-suffix-two"), &hash));

        // One character short does not
        assert!(!hasher.verify(&base[..DEFAULT_MAX_PASSWORD_LENGTH - 1], &hash));
    }

    #[test]
    fn test_truncation_counts_characters() {
        let hasher = PasswordHasher::new(HashPolicy {
            max_password_length: 3,
            ..fast_policy()
        })
        .unwrap();
        assert_eq!(hasher.truncate("éléphant"), "élé");
        assert_eq!(hasher.truncate("ab"), "ab");
    }

    #[test]
    fn test_short_max_length_still_starts() {
        for max_password_length in [1, 8, 15] {
            let policy = HashPolicy {
                max_password_length,
                ..fast_policy()
            };
            let argon = PasswordHasher::new(policy).unwrap();
            assert_eq!(argon.algorithm(), HashAlgorithm::Argon2id);
            assert!(PasswordHasher::with_algorithm(HashAlgorithm::Scrypt, policy).is_ok());

            let hash = argon.hash("p4ssword-with-tail").unwrap();
            assert!(argon.verify("p4ssword-with-tail", &hash));
            assert!(!argon.verify("X4ssword-with-tail", &hash));
        }
    }

    #[test]
    fn test_falls_back_to_scrypt_when_argon2_rejected() {
        // Argon2 rejects zero iterations
        let hasher = PasswordHasher::new(HashPolicy {
            work_factor: 0,
            ..fast_policy()
        })
        .unwrap();
        assert_eq!(hasher.algorithm(), HashAlgorithm::Scrypt);

        let hash = hasher.hash("fallback-password").unwrap();
        assert!(hash.starts_with("$scrypt$"));
        assert!(hasher.verify("fallback-password", &hash));
    }

    #[test]
    fn test_verify_accepts_either_algorithm() {
        let argon = hasher();
        let scrypt = PasswordHasher::with_algorithm(HashAlgorithm::Scrypt, fast_policy()).unwrap();

        let scrypt_hash = scrypt.hash("shared").unwrap();
        let argon_hash = argon.hash("shared").unwrap();

        assert!(argon.verify("shared", &scrypt_hash));
        assert!(scrypt.verify("shared", &argon_hash));
    }

    #[test]
    fn test_needs_rehash() {
        let weak = hasher();
        let weak_hash = weak.hash("pw").unwrap();
        assert!(!weak.needs_rehash(&weak_hash));

        let stronger = PasswordHasher::new(HashPolicy {
            work_factor: 2,
            ..fast_policy()
        })
        .unwrap();
        assert!(stronger.needs_rehash(&weak_hash));

        // Lower memory cost than the active policy
        let more_memory = PasswordHasher::new(HashPolicy {
            memory_kib: 2048,
            ..fast_policy()
        })
        .unwrap();
        assert!(more_memory.needs_rehash(&weak_hash));
        assert!(!weak.needs_rehash(&more_memory.hash("pw").unwrap()));

        // Different algorithm always needs rehash
        let scrypt = PasswordHasher::with_algorithm(HashAlgorithm::Scrypt, fast_policy()).unwrap();
        assert!(scrypt.needs_rehash(&weak_hash));
        assert!(weak.needs_rehash(&scrypt.hash("pw").unwrap()));

        assert!(weak.needs_rehash("garbage"));
    }

    #[test]
    fn test_zero_max_length_rejected() {
        let result = PasswordHasher::new(HashPolicy {
            max_password_length: 0,
            ..fast_policy()
        });
        assert!(result.is_err());
    }
}
