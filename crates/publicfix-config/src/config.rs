//! Configuration management for the PublicFix client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default backend URL (can be overridden at compile time via PUBLICFIX_BACKEND_URL env var).
pub const DEFAULT_BACKEND_URL: &str = match option_env!("PUBLICFIX_BACKEND_URL") {
    Some(url) => url,
    None => "https://publicfix-backend.vercel.app",
};

/// Default URL scheme the backend redirects back to after authentication.
pub const DEFAULT_REDIRECT_SCHEME: &str = "publicfix";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default upper bound on a sign-in session, in seconds. A browser left open
/// past this is treated as a failed sign-in.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 180;

/// Maximum allowed sign-in session timeout, in seconds.
pub const MAX_SESSION_TIMEOUT_SECS: u64 = 600;

/// Main client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Backend base URL.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    /// URL scheme used for the auth redirect target.
    #[serde(default = "default_redirect_scheme")]
    pub redirect_scheme: String,
    /// Sign-in session timeout in seconds.
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_redirect_scheme() -> String {
    DEFAULT_REDIRECT_SCHEME.to_string()
}

fn default_session_timeout_secs() -> u64 {
    DEFAULT_SESSION_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            redirect_scheme: DEFAULT_REDIRECT_SCHEME.to_string(),
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    /// Note: backend_url is compile-time only and always uses the built-in
    /// default, regardless of what's in the config file.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        // Force compile-time value (never from config file)
        config.backend_url = DEFAULT_BACKEND_URL.to_string();

        config.session_timeout_secs = config.session_timeout_secs.min(MAX_SESSION_TIMEOUT_SECS);
        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let config_path = paths.config_file();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Override configuration from environment variables.
    /// Only log_level can be overridden at runtime.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("PUBLICFIX_LOG_LEVEL") {
            self.log_level = log_level;
        }
    }

    /// Get the backend URL as a parsed URL.
    pub fn backend_url(&self) -> CoreResult<Url> {
        Url::parse(&self.backend_url).map_err(CoreError::from)
    }

    /// The redirect target the backend must send the browser back to,
    /// e.g. `publicfix://auth-callback`.
    pub fn redirect_target(&self) -> String {
        format!("{}://auth-callback", self.redirect_scheme)
    }
}
