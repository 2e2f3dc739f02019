//! Credential lookup seam
//!
//! User records belong to the users service. The auth core only needs to
//! find a credential by email, register one, and upgrade a stale hash after
//! a successful login. `InMemoryCredentialStore` backs the reference server
//! and the tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::{PasswordHasher, Role};
use crate::types::{Result, WardenError};

/// What the auth core knows about a subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub subject_id: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub active: bool,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a credential by email (case-insensitive)
    async fn find_by_email(&self, email: &str) -> Result<Option<StoredCredential>>;

    /// Store a new credential. An email that is already taken is `Malformed`.
    async fn insert(&self, credential: StoredCredential) -> Result<()>;

    /// Replace the stored hash for a subject
    async fn update_hash(&self, subject_id: &str, password_hash: String) -> Result<()>;
}

/// Credentials keyed by lowercased email
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    entries: RwLock<HashMap<String, StoredCredential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Seed the demo accounts used in development
    pub async fn seed_demo_users(&self, hasher: &PasswordHasher) -> Result<()> {
        let demo = [
            ("admin@hospital.com", "admin123", Role::Admin),
            ("medecin@hospital.com", "med123", Role::Clinician),
            ("patient@hospital.com", "pat123", Role::Patient),
        ];

        for (email, password, role) in demo {
            self.insert(StoredCredential {
                subject_id: new_subject_id(),
                email: email.to_string(),
                password_hash: hasher.hash(password)?,
                role,
                active: true,
            })
            .await?;
        }

        info!(count = demo.len(), "Seeded demo users");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<StoredCredential>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&normalize_email(email)).cloned())
    }

    async fn insert(&self, credential: StoredCredential) -> Result<()> {
        let key = normalize_email(&credential.email);
        let mut entries = self.entries.write().await;
        if entries.contains_key(&key) {
            return Err(WardenError::Malformed("Email already registered".into()));
        }
        debug!(subject = %credential.subject_id, role = %credential.role, "Credential stored");
        entries.insert(key, credential);
        Ok(())
    }

    async fn update_hash(&self, subject_id: &str, password_hash: String) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .values_mut()
            .find(|c| c.subject_id == subject_id)
            .ok_or_else(|| WardenError::Internal(format!("Unknown subject {}", subject_id)))?;
        entry.password_hash = password_hash;
        Ok(())
    }
}

pub fn new_subject_id() -> String {
    format!("user-{}", Uuid::new_v4())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::HashPolicy;
    use tokio_test::{assert_err, assert_ok};

    fn credential(email: &str) -> StoredCredential {
        StoredCredential {
            subject_id: new_subject_id(),
            email: email.into(),
            password_hash: "$argon2id$placeholder".into(),
            role: Role::Patient,
            active: true,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = InMemoryCredentialStore::new();
        store.insert(credential("Jane@Hospital.com")).await.unwrap();

        let found = store.find_by_email("jane@hospital.com").await.unwrap();
        assert_eq!(found.unwrap().email, "Jane@Hospital.com");
        assert!(store.find_by_email("nobody@hospital.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = InMemoryCredentialStore::new();
        store.insert(credential("a@b.com")).await.unwrap();
        assert!(matches!(
            store.insert(credential("A@B.com")).await,
            Err(WardenError::Malformed(_))
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_hash() {
        let store = InMemoryCredentialStore::new();
        let cred = credential("a@b.com");
        let subject = cred.subject_id.clone();
        store.insert(cred).await.unwrap();

        assert_ok!(store.update_hash(&subject, "new-hash".into()).await);
        let found = store.find_by_email("a@b.com").await.unwrap().unwrap();
        assert_eq!(found.password_hash, "new-hash");

        assert_err!(store.update_hash("user-missing", "x".into()).await);
    }

    #[tokio::test]
    async fn test_seed_demo_users() {
        let hasher = PasswordHasher::new(HashPolicy {
            work_factor: 1,
            memory_kib: 1024,
            max_password_length: 50,
        })
        .unwrap();
        let store = InMemoryCredentialStore::new();
        store.seed_demo_users(&hasher).await.unwrap();

        let admin = store.find_by_email("admin@hospital.com").await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(hasher.verify("admin123", &admin.password_hash));
    }
}
