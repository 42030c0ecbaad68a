//! Auth redirect parsing.
//!
//! The redirect can reach the app through two entry points: a raw deep-link
//! URL, or a router-delivered screen whose navigation params carry the same
//! payload. Both converge on [`AuthPayload`] before anything is persisted.

use credential_store::UserProfile;
use thiserror::Error;
use url::Url;

/// Query parameter carrying the opaque token.
const TOKEN_PARAM: &str = "token";

/// Query parameter carrying the optional user profile.
const USER_DATA_PARAM: &str = "userData";

/// Marker segment identifying an auth redirect URL.
const CALLBACK_MARKER: &str = "auth-callback";

/// Parsed auth redirect payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthPayload {
    /// Opaque backend-issued token, never empty
    pub token: String,
    /// Optional profile; decode failures degrade to the opaque form
    pub profile: Option<UserProfile>,
}

/// Reasons a redirect carries no usable credential.
///
/// An undecodable `userData` value is deliberately not represented here: the
/// profile falls back to its raw string form instead of failing the parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    /// The URL had no query component at all
    #[error("Redirect carried no auth payload")]
    NoPayload,

    /// A payload was present but the token was absent or empty
    #[error("Redirect payload is missing the token")]
    MissingToken,
}

/// Parse a raw redirect URL into an [`AuthPayload`].
pub fn parse_redirect_url(raw_url: &str) -> Result<AuthPayload, CallbackError> {
    let url = Url::parse(raw_url).map_err(|_| CallbackError::NoPayload)?;

    match url.query() {
        None | Some("") => return Err(CallbackError::NoPayload),
        Some(_) => {}
    }

    let mut token = None;
    let mut user_data = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            TOKEN_PARAM => token = Some(value.into_owned()),
            USER_DATA_PARAM => user_data = Some(value.into_owned()),
            _ => {}
        }
    }

    build_payload(token, user_data)
}

/// Build an [`AuthPayload`] from already-decomposed query parameters, as
/// handed in by a navigation layer.
pub fn from_query_params<'a, I>(params: I) -> Result<AuthPayload, CallbackError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut any = false;
    let mut token = None;
    let mut user_data = None;
    for (key, value) in params {
        any = true;
        match key {
            TOKEN_PARAM => token = Some(value.to_string()),
            USER_DATA_PARAM => user_data = Some(value.to_string()),
            _ => {}
        }
    }

    if !any {
        return Err(CallbackError::NoPayload);
    }

    build_payload(token, user_data)
}

fn build_payload(
    token: Option<String>,
    user_data: Option<String>,
) -> Result<AuthPayload, CallbackError> {
    let token = match token {
        Some(token) if !token.is_empty() => token,
        _ => return Err(CallbackError::MissingToken),
    };

    let profile = user_data
        .filter(|raw| !raw.is_empty())
        .map(|raw| UserProfile::from_raw(&raw));

    Ok(AuthPayload { token, profile })
}

/// Whether an inbound URL is the redirect for the given target.
///
/// Deliberately tolerant about where the `auth-callback` marker appears: a
/// custom-scheme deep link (`publicfix://auth-callback?...`) parses it as the
/// host, while a loopback delivery (`http://127.0.0.1:9123/auth-callback?...`)
/// carries it in the path. An http(s) delivery must come from the target's
/// own host and port; any other host carrying the marker is someone else's
/// URL.
pub fn matches_redirect_target(raw_url: &str, target: &str) -> bool {
    let Ok(url) = Url::parse(raw_url) else {
        return false;
    };

    let origin_ok = match Url::parse(target) {
        Ok(target) => {
            if matches!(url.scheme(), "http" | "https") {
                url.host_str() == target.host_str()
                    && url.port_or_known_default() == target.port_or_known_default()
            } else {
                url.scheme() == target.scheme()
            }
        }
        Err(_) => true,
    };
    if !origin_ok {
        return false;
    }

    if url.host_str() == Some(CALLBACK_MARKER) {
        return true;
    }
    url.path_segments()
        .map(|mut segments| segments.any(|s| s == CALLBACK_MARKER))
        .unwrap_or(false)
}

/// Percent-encode a string for use as a single query component.
pub fn encode_query_component(s: &str) -> String {
    let mut result = String::new();
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => result.push(c),
            _ => {
                for byte in c.to_string().as_bytes() {
                    result.push_str(&format!("%{:02X}", byte));
                }
            }
        }
    }
    result
}
