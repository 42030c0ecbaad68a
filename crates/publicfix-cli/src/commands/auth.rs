//! Authentication commands.

use super::open_store;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use async_trait::async_trait;
use auth_flow::{
    AuthError, AuthResult, BrowserOutcome, BrowserSession, DeepLinkHub, LoopbackRedirectServer,
    Navigator, Screen, SignInController, SignInOptions, SignInOutcome,
};
use credential_store::StoredCredential;
use publicfix_config::Config;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Browser session backed by the system default browser.
///
/// The system browser gives no close or dismiss signal, so the session
/// reports `Closed` right after launching and the redirect arrives through
/// the loopback receiver.
struct SystemBrowser;

#[async_trait]
impl BrowserSession for SystemBrowser {
    async fn open(&self, auth_url: &str, _redirect_target: &str) -> AuthResult<BrowserOutcome> {
        debug!(url = %auth_url, "opening system browser");
        open::that(auth_url).map_err(|e| AuthError::Browser(e.to_string()))?;
        Ok(BrowserOutcome::Closed)
    }
}

/// The CLI has no screens to switch; destinations are only logged.
struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, screen: Screen) {
        info!(?screen, "sign-in destination");
    }
}

fn display_name(credential: &StoredCredential) -> String {
    credential
        .profile
        .as_ref()
        .and_then(|p| p.display_name())
        .unwrap_or("user")
        .to_string()
}

/// Sign in through the browser-delegated flow.
pub async fn login(config: &Config, format: &OutputFormat) -> Result<()> {
    let store = open_store()?;

    if let Some(credential) = store.get()? {
        output::print_success(
            &format!("Already signed in as {}", display_name(&credential)),
            format,
        );
        return Ok(());
    }

    let hub = DeepLinkHub::new();
    let server = LoopbackRedirectServer::new(hub.clone()).start().await?;

    let options = SignInOptions::new(config.backend_url.clone(), server.redirect_target())
        .with_timeout(Duration::from_secs(config.session_timeout_secs));

    let controller = SignInController::new(
        options,
        Arc::clone(&store),
        hub,
        Arc::new(SystemBrowser),
        Arc::new(LogNavigator),
    );

    println!("Opening your browser to sign in to PublicFix...");
    println!("Waiting for sign-in to complete (Ctrl+C to abort).");

    let outcome = controller.sign_in().await?;
    server.shutdown();

    match outcome {
        SignInOutcome::Resolved(credential) => {
            output::print_success(
                &format!("Signed in as {}", display_name(&credential)),
                format,
            );
        }
        SignInOutcome::Cancelled => {
            output::print_success("Sign-in cancelled", format);
        }
        SignInOutcome::Failed(failure) => {
            output::print_error(&format!("Sign-in failed: {}", failure), format);
        }
    }

    Ok(())
}

/// Sign out and remove the stored credential.
pub async fn logout(format: &OutputFormat) -> Result<()> {
    let store = open_store()?;

    if store.get()?.is_none() {
        output::print_success("Not signed in", format);
        return Ok(());
    }

    store.clear()?;
    output::print_success("Signed out", format);
    Ok(())
}

/// Show the current authentication status.
pub async fn status(format: &OutputFormat) -> Result<()> {
    let store = open_store()?;
    let credential = store.get()?;

    match format {
        OutputFormat::Text => match &credential {
            Some(credential) => {
                println!("Auth:     signed in");
                output::print_row("User", &display_name(credential));
            }
            None => {
                println!("Auth:     not signed in");
            }
        },
        OutputFormat::Json => {
            let json = serde_json::json!({
                "signed_in": credential.is_some(),
                "user": credential.as_ref().map(display_name),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    Ok(())
}
