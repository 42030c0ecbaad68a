//! Configuration and shared utilities for the PublicFix client.
//!
//! This crate provides:
//! - Application configuration (backend URL, redirect scheme, timeouts)
//! - File system paths under `~/.publicfix`
//! - Logging initialization

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_BACKEND_URL, DEFAULT_LOG_LEVEL, DEFAULT_REDIRECT_SCHEME,
    DEFAULT_SESSION_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
