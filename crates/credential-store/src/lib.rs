//! Durable credential persistence for the PublicFix client.
//!
//! This crate provides:
//! - A swappable key-value storage trait (`CredentialStorage`)
//! - A file-backed backend and an in-memory backend
//! - A high-level `CredentialStore` facade over the fixed `token` /
//!   `userInfo` keys
//!
//! Absence of the `token` key is the sole authoritative "logged out" signal.

mod credentials;
mod file;
mod keys;
mod memory;
mod traits;

pub use credentials::{CredentialStore, ProfileWrite, StoredCredential, UserProfile};
pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::CredentialStorage;

use std::path::PathBuf;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying storage backend unavailable or failing
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create a credential store backed by a JSON file at the given path.
pub fn create_file_store(path: PathBuf) -> CredentialStore {
    CredentialStore::new(Box::new(FileStorage::new(path)))
}

/// Create a credential store backed by process memory. Nothing survives a
/// restart; intended for tests and ephemeral sessions.
pub fn create_memory_store() -> CredentialStore {
    CredentialStore::new(Box::new(MemoryStorage::new()))
}
