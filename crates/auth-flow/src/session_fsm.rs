//! Sign-in session state machine using rust-fsm.
//!
//! One sign-in attempt is one walk through this machine. Keeping the state
//! explicit (instead of free-floating "auth in progress" booleans) makes
//! illegal moves, such as starting a second attempt while one is active,
//! structurally impossible.
//!
//! ## State diagram
//!
//! ```text
//! ┌──────────┐ StartSignIn ┌─────────────────┐
//! │   Idle   │────────────►│ AwaitingBrowser │
//! └──────────┘             └───────┬─────────┘
//!      ▲                           │
//!      │          BrowserClosed    │  CredentialPersisted ──► Resolved
//!      │                           │  BrowserDismissed    ──► Cancelled
//!      │                           ▼  PersistFailed/TimedOut ──► Failed
//!      │                  ┌──────────────────┐
//!      │                  │ AwaitingRedirect │
//!      │                  └───────┬──────────┘
//!      │                          │  CredentialPersisted ──► Resolved
//!      │                          │  PersistFailed/TimedOut/
//!      │                          │  NoUsablePayload     ──► Failed
//!      │                          │  CancelRequested     ──► Cancelled
//!      │     Acknowledged         ▼
//!      └──────────── Resolved / Cancelled / Failed
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub sign_in_machine(Idle)

    Idle => {
        StartSignIn => AwaitingBrowser
    },
    AwaitingBrowser => {
        // Browser surface closed without delivering a payload; the redirect
        // may still arrive out of band
        BrowserClosed => AwaitingRedirect,
        // Explicit user dismissal with no usable payload
        BrowserDismissed => Cancelled,
        // A payload won the race and the store write succeeded
        CredentialPersisted => Resolved,
        PersistFailed => Failed,
        // Browser surface could not be launched at all
        BrowserFailed => Failed,
        CancelRequested => Cancelled,
        TimedOut => Failed
    },
    AwaitingRedirect => {
        CredentialPersisted => Resolved,
        PersistFailed => Failed,
        NoUsablePayload => Failed,
        CancelRequested => Cancelled,
        TimedOut => Failed
    },
    Resolved => {
        Acknowledged => Idle
    },
    Cancelled => {
        Acknowledged => Idle
    },
    Failed => {
        Acknowledged => Idle
    }
}

// Re-export the generated types with clearer names
pub use sign_in_machine::Input as SignInInput;
pub use sign_in_machine::State as SignInState;
pub use sign_in_machine::StateMachine as SignInMachine;

/// User-facing view of the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No sign-in attempt active.
    Idle,
    /// Browser session launched, racing against the redirect.
    AwaitingBrowser,
    /// Browser surface closed without a payload; still listening for the
    /// redirect.
    AwaitingRedirect,
    /// Credential parsed and persisted.
    Resolved,
    /// User dismissed the browser without completing sign-in.
    Cancelled,
    /// Sign-in failed (storage fault, timeout, or no usable payload).
    Failed,
}

impl SessionStatus {
    /// Returns true if the session reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Resolved | SessionStatus::Cancelled | SessionStatus::Failed
        )
    }

    /// Returns true if a sign-in attempt is in flight.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionStatus::AwaitingBrowser | SessionStatus::AwaitingRedirect
        )
    }
}

impl From<&SignInState> for SessionStatus {
    fn from(state: &SignInState) -> Self {
        match state {
            SignInState::Idle => SessionStatus::Idle,
            SignInState::AwaitingBrowser => SessionStatus::AwaitingBrowser,
            SignInState::AwaitingRedirect => SessionStatus::AwaitingRedirect,
            SignInState::Resolved => SessionStatus::Resolved,
            SignInState::Cancelled => SessionStatus::Cancelled,
            SignInState::Failed => SessionStatus::Failed,
        }
    }
}
