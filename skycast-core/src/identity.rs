//! Local accounts used only to scope the preference store.
//!
//! Credentials live in the same key/value storage as preferences, keyed by
//! normalized email, with Argon2 password hashes. The active session is a
//! separate key so signing out never touches the credential store.

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc};
use uuid::Uuid;

use crate::{
    error::{IdentityError, StorageError},
    preferences::Scope,
    storage::KeyValueStorage,
};

const USERS_KEY: &str = "skycast:authUsers";
const SESSION_KEY: &str = "skycast:authSession";

pub const MIN_PASSWORD_LEN: usize = 6;

/// Who the current session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Identity {
    #[default]
    Guest,
    User { id: String, email: String },
}

impl Identity {
    pub fn scope(&self) -> Scope {
        match self {
            Identity::Guest => Scope::Guest,
            Identity::User { id, .. } => Scope::User(id.clone()),
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Identity::Guest => None,
            Identity::User { email, .. } => Some(email),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Guest => f.write_str("guest"),
            Identity::User { email, .. } => f.write_str(email),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredUser {
    id: String,
    password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSession {
    id: String,
    email: String,
    created_at: DateTime<Utc>,
}

pub struct IdentityProvider {
    storage: Arc<dyn KeyValueStorage>,
    hasher: Argon2<'static>,
}

impl fmt::Debug for IdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityProvider").finish_non_exhaustive()
    }
}

impl IdentityProvider {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::with_hasher(storage, Argon2::default())
    }

    pub fn with_hasher(storage: Arc<dyn KeyValueStorage>, hasher: Argon2<'static>) -> Self {
        Self { storage, hasher }
    }

    /// The persisted session, or `Guest` when there is none.
    pub fn current(&self) -> Identity {
        let raw = match self.storage.get(SESSION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Identity::Guest,
            Err(e) => {
                tracing::warn!(error = %e, "could not read session, continuing as guest");
                return Identity::Guest;
            }
        };

        match serde_json::from_str::<StoredSession>(&raw) {
            Ok(session) => Identity::User {
                id: session.id,
                email: session.email,
            },
            Err(e) => {
                tracing::warn!(error = %e, "stored session is corrupt, continuing as guest");
                Identity::Guest
            }
        }
    }

    pub fn sign_up(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(IdentityError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters long."
            )));
        }

        let mut users = self.read_users()?;
        if users.contains_key(&email) {
            return Err(IdentityError::DuplicateAccount);
        }

        let salt = SaltString::generate(&mut rand::rngs::OsRng);
        let password_hash = self
            .hasher
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| IdentityError::Hashing(e.to_string()))?
            .to_string();

        let previous = users.clone();
        let id = Uuid::new_v4().to_string();
        users.insert(
            email.clone(),
            StoredUser {
                id: id.clone(),
                password_hash,
            },
        );
        self.write_json(USERS_KEY, &users)?;

        match self.start_session(id.clone(), email) {
            Ok(identity) => {
                tracing::info!(user_id = %id, "account created");
                Ok(identity)
            }
            Err(e) => {
                // Undo the account so a retry is not reported as a duplicate.
                if let Err(restore) = self.write_json(USERS_KEY, &previous) {
                    tracing::error!(error = %restore, "could not roll back account creation");
                }
                Err(e)
            }
        }
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<Identity, IdentityError> {
        let email = normalize_email(email)?;

        let users = self.read_users()?;
        let user = users
            .get(&email)
            .ok_or(IdentityError::InvalidCredentials)?;

        let parsed = PasswordHash::new(&user.password_hash).map_err(|e| {
            tracing::warn!(error = %e, "stored password hash is malformed");
            IdentityError::InvalidCredentials
        })?;
        self.hasher
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| IdentityError::InvalidCredentials)?;

        self.start_session(user.id.clone(), email)
    }

    /// Clears the active session. Credentials and preferences stay.
    pub fn sign_out(&self) -> Result<(), IdentityError> {
        self.storage.remove(SESSION_KEY)?;
        tracing::info!("signed out");
        Ok(())
    }

    fn start_session(&self, id: String, email: String) -> Result<Identity, IdentityError> {
        let session = StoredSession {
            id,
            email,
            created_at: Utc::now(),
        };
        self.write_json(SESSION_KEY, &session)?;

        Ok(Identity::User {
            id: session.id,
            email: session.email,
        })
    }

    /// Absent or corrupt data reads as no accounts; a failed read is an error
    /// so that nothing is written over credentials that could not be seen.
    fn read_users(&self) -> Result<HashMap<String, StoredUser>, StorageError> {
        let Some(raw) = self.storage.get(USERS_KEY)? else {
            return Ok(HashMap::new());
        };

        Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "credential store is corrupt, treating as empty");
            HashMap::new()
        }))
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), IdentityError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| IdentityError::Hashing(format!("could not encode {key}: {e}")))?;
        self.storage.set(key, &raw)?;
        Ok(())
    }
}

fn normalize_email(email: &str) -> Result<String, IdentityError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(IdentityError::Validation("Email is required.".to_string()));
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use argon2::{Algorithm, Params, Version};

    fn cheap_hasher() -> Argon2<'static> {
        Argon2::new(
            Algorithm::Argon2id,
            Version::V0x13,
            Params::new(8, 1, 1, None).unwrap(),
        )
    }

    fn provider() -> (Arc<MemoryStorage>, IdentityProvider) {
        let storage = Arc::new(MemoryStorage::new());
        let provider = IdentityProvider::with_hasher(storage.clone(), cheap_hasher());
        (storage, provider)
    }

    /// Refuses writes to the session key only.
    struct SessionWritesFail(MemoryStorage);

    impl KeyValueStorage for SessionWritesFail {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if key == SESSION_KEY {
                return Err(StorageError::Disabled);
            }
            self.0.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.0.remove(key)
        }
    }

    #[test]
    fn sign_up_validates_input() {
        let (_, idp) = provider();
        assert!(matches!(
            idp.sign_up("   ", "secret1"),
            Err(IdentityError::Validation(m)) if m == "Email is required."
        ));
        assert!(matches!(
            idp.sign_up("a@b.c", "12345"),
            Err(IdentityError::Validation(_))
        ));
    }

    #[test]
    fn duplicate_normalized_email_is_rejected() {
        let (_, idp) = provider();
        idp.sign_up("Ann@Example.com", "secret1").unwrap();
        assert!(matches!(
            idp.sign_up("  ann@example.COM ", "another1"),
            Err(IdentityError::DuplicateAccount)
        ));
    }

    #[test]
    fn sign_up_starts_a_persistent_session() {
        let (storage, idp) = provider();
        let identity = idp.sign_up("ann@example.com", "secret1").unwrap();

        let reloaded = IdentityProvider::new(storage.clone());
        assert_eq!(reloaded.current(), identity);
        assert_eq!(identity.email(), Some("ann@example.com"));
        assert!(matches!(identity.scope(), Scope::User(id) if !id.is_empty()));

        let raw = storage.get(USERS_KEY).unwrap().unwrap();
        assert!(!raw.contains("secret1"));
    }

    #[test]
    fn sign_in_checks_credentials() {
        let (_, idp) = provider();
        let created = idp.sign_up("ann@example.com", "secret1").unwrap();
        idp.sign_out().unwrap();

        assert!(matches!(
            idp.sign_in("ann@example.com", "wrong!!"),
            Err(IdentityError::InvalidCredentials)
        ));
        assert!(matches!(
            idp.sign_in("bob@example.com", "secret1"),
            Err(IdentityError::InvalidCredentials)
        ));
        assert!(matches!(idp.sign_in("", "x"), Err(IdentityError::Validation(_))));

        let signed_in = idp.sign_in(" ANN@example.com", "secret1").unwrap();
        assert_eq!(signed_in, created);
    }

    #[test]
    fn sign_out_keeps_credentials() {
        let (storage, idp) = provider();
        idp.sign_up("ann@example.com", "secret1").unwrap();
        idp.sign_out().unwrap();

        assert_eq!(idp.current(), Identity::Guest);
        assert!(storage.get(USERS_KEY).unwrap().is_some());
        assert!(idp.sign_in("ann@example.com", "secret1").is_ok());
    }

    #[test]
    fn corrupt_session_reads_as_guest() {
        let (storage, idp) = provider();
        storage.set(SESSION_KEY, "not json").unwrap();
        assert_eq!(idp.current(), Identity::Guest);
    }

    #[test]
    fn unreadable_credentials_are_never_overwritten() {
        let (storage, idp) = provider();
        idp.sign_up("ann@example.com", "secret1").unwrap();
        let before = storage.get(USERS_KEY).unwrap();

        storage.set_reads_failing(true);
        assert!(matches!(
            idp.sign_up("bob@example.com", "secret2"),
            Err(IdentityError::Storage(_))
        ));
        assert!(matches!(
            idp.sign_in("ann@example.com", "secret1"),
            Err(IdentityError::Storage(_))
        ));
        storage.set_reads_failing(false);

        assert_eq!(storage.get(USERS_KEY).unwrap(), before);
        assert!(idp.sign_in("ann@example.com", "secret1").is_ok());
        assert!(idp.sign_in("bob@example.com", "secret2").is_err());
    }

    #[test]
    fn failed_session_write_rolls_back_the_account() {
        let storage = Arc::new(SessionWritesFail(MemoryStorage::new()));
        let idp = IdentityProvider::with_hasher(storage.clone(), cheap_hasher());

        assert!(matches!(
            idp.sign_up("ann@example.com", "secret1"),
            Err(IdentityError::Storage(_))
        ));
        assert_eq!(idp.current(), Identity::Guest);
        assert_eq!(storage.0.get(USERS_KEY).unwrap().as_deref(), Some("{}"));

        // A retry fails the same way instead of claiming a duplicate.
        assert!(matches!(
            idp.sign_up("ann@example.com", "secret1"),
            Err(IdentityError::Storage(_))
        ));
    }
}
