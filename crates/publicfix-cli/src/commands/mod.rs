//! CLI command implementations.

mod auth;

pub use auth::{login, logout, status};

use anyhow::Result;
use credential_store::{create_file_store, CredentialStore};
use publicfix_config::Paths;
use std::sync::Arc;

/// Open the file-backed credential store under `~/.publicfix`.
pub(crate) fn open_store() -> Result<Arc<CredentialStore>> {
    let paths = Paths::new()?;
    paths.ensure_dirs()?;
    Ok(Arc::new(create_file_store(paths.credentials_file())))
}
