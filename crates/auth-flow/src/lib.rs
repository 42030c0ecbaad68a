//! Browser-delegated sign-in flow for the PublicFix client.
//!
//! This crate provides:
//! - Parsing of the auth redirect (deep-link URL or pre-parsed query params)
//! - A deep-link hub bridging OS "opened via URL" notifications into events
//! - An explicit FSM-based sign-in session with race resolution between the
//!   browser result and the redirect
//! - A loopback HTTP receiver for desktop redirect delivery
//! - Terminal-state to screen navigation mapping

mod callback;
mod controller;
mod deep_link;
mod error;
mod loopback;
mod navigation;
mod session_fsm;

pub use callback::{
    encode_query_component, from_query_params, matches_redirect_target, parse_redirect_url,
    AuthPayload, CallbackError,
};
pub use controller::{
    BrowserOutcome, BrowserSession, SignInController, SignInFailure, SignInOptions, SignInOutcome,
    DEFAULT_SIGN_IN_TIMEOUT_SECS,
};
pub use deep_link::{DeepLinkEvent, DeepLinkHub};
pub use error::{AuthError, AuthResult};
pub use loopback::{LoopbackRedirectServer, LoopbackServerHandle};
pub use navigation::{resolve_destination, Navigator, Screen};
pub use session_fsm::{sign_in_machine, SessionStatus, SignInInput, SignInMachine, SignInState};
