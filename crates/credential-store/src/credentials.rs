//! High-level API for the stored credential.

use crate::{CredentialStorage, StorageError, StorageKeys, StorageResult};

/// User profile delivered alongside the token.
///
/// The backend usually sends a JSON blob, but the redirect may carry an
/// arbitrary string; an undecodable profile is kept verbatim rather than
/// dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum UserProfile {
    /// Profile decoded as JSON
    Structured(serde_json::Value),
    /// Raw string fallback for unstructured user data
    Opaque(String),
}

impl UserProfile {
    /// Decode raw user data, falling back to the opaque form when it is not
    /// valid JSON.
    pub fn from_raw(raw: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) => UserProfile::Structured(value),
            Err(e) => {
                tracing::warn!("user data is not valid JSON, keeping raw string: {}", e);
                UserProfile::Opaque(raw.to_string())
            }
        }
    }

    /// Render the profile to the string form stored under `userInfo`.
    pub fn to_stored_string(&self) -> StorageResult<String> {
        match self {
            UserProfile::Structured(value) => {
                serde_json::to_string(value).map_err(|e| StorageError::Encoding(e.to_string()))
            }
            UserProfile::Opaque(raw) => Ok(raw.clone()),
        }
    }

    /// Best-effort display name, when the profile carries one.
    pub fn display_name(&self) -> Option<&str> {
        match self {
            UserProfile::Structured(value) => value
                .get("name")
                .or_else(|| value.get("email"))
                .and_then(|v| v.as_str()),
            UserProfile::Opaque(_) => None,
        }
    }
}

/// The durable credential: an opaque token plus an optional profile.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCredential {
    pub token: String,
    pub profile: Option<UserProfile>,
}

/// What to do with the stored profile on a `put`.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileWrite {
    /// Leave any previously stored profile untouched
    Keep,
    /// Remove any previously stored profile
    Clear,
    /// Overwrite the stored profile
    Set(UserProfile),
}

/// High-level store for the credential, over a swappable storage backend.
///
/// All operations are idempotent and last-write-wins. The token is written
/// before the profile, so a failing profile write never corrupts an
/// already-written token.
pub struct CredentialStore {
    storage: Box<dyn CredentialStorage>,
}

impl CredentialStore {
    /// Create a new credential store with the given storage backend.
    pub fn new(storage: Box<dyn CredentialStorage>) -> Self {
        Self { storage }
    }

    /// Persist the credential.
    ///
    /// Rejects an empty token: the application treats presence of the token
    /// key as "authenticated", so an empty value must never be written.
    pub fn put(&self, token: &str, profile: ProfileWrite) -> StorageResult<()> {
        if token.is_empty() {
            return Err(StorageError::Encoding(
                "refusing to store an empty token".to_string(),
            ));
        }

        self.storage.set(StorageKeys::TOKEN, token)?;

        match profile {
            ProfileWrite::Keep => {}
            ProfileWrite::Clear => {
                let _ = self.storage.delete(StorageKeys::USER_INFO)?;
            }
            ProfileWrite::Set(profile) => {
                let rendered = profile.to_stored_string()?;
                self.storage.set(StorageKeys::USER_INFO, &rendered)?;
            }
        }

        Ok(())
    }

    /// Read the stored credential, if any.
    pub fn get(&self) -> StorageResult<Option<StoredCredential>> {
        let token = match self.storage.get(StorageKeys::TOKEN)? {
            Some(token) if !token.is_empty() => token,
            _ => return Ok(None),
        };

        let profile = self
            .storage
            .get(StorageKeys::USER_INFO)?
            .map(|raw| match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(value) => UserProfile::Structured(value),
                Err(_) => UserProfile::Opaque(raw),
            });

        Ok(Some(StoredCredential { token, profile }))
    }

    /// Remove the stored credential. Idempotent.
    pub fn clear(&self) -> StorageResult<()> {
        let _ = self.storage.delete(StorageKeys::TOKEN)?;
        let _ = self.storage.delete(StorageKeys::USER_INFO)?;
        Ok(())
    }

    /// Whether a non-empty token is present.
    pub fn is_authenticated(&self) -> StorageResult<bool> {
        Ok(self.get()?.is_some())
    }
}
