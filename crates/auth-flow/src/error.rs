//! Sign-in flow error types.

use thiserror::Error;

/// Error type for the sign-in flow.
///
/// User cancellation is not an error; it is a normal terminal outcome
/// reported through `SignInOutcome::Cancelled`.
#[derive(Error, Debug)]
pub enum AuthError {
    /// A sign-in attempt is already active
    #[error("A sign-in attempt is already in progress")]
    SignInInProgress,

    /// Browser session could not be launched or crashed
    #[error("Browser session failed: {0}")]
    Browser(String),

    /// Credential storage unavailable; the sign-in is failed, never partial
    #[error("Storage unavailable: {0}")]
    Storage(#[from] credential_store::StorageError),

    /// Invalid state transition in the sign-in FSM
    #[error("Invalid sign-in state transition: {0}")]
    InvalidStateTransition(String),

    /// Loopback redirect receiver error
    #[error("Redirect receiver error: {0}")]
    RedirectReceiver(String),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
