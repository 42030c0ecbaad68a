//! Loopback HTTP receiver for the auth redirect.
//!
//! On desktop there is no OS deep-link registration to rely on, so the
//! backend redirects the browser to a short-lived local HTTP server instead.
//! The server rebuilds the full redirect URL and feeds it into the
//! [`DeepLinkHub`], where the active sign-in session picks it up exactly
//! like an OS-delivered deep link.

use crate::callback::parse_redirect_url;
use crate::deep_link::DeepLinkHub;
use crate::error::AuthResult;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Path the backend redirects to on the loopback host.
const CALLBACK_PATH: &str = "/auth-callback";

/// Redirect receiver bound to an ephemeral loopback port.
pub struct LoopbackRedirectServer {
    hub: DeepLinkHub,
}

impl LoopbackRedirectServer {
    pub fn new(hub: DeepLinkHub) -> Self {
        Self { hub }
    }

    /// Bind and start serving. The returned handle owns the server task.
    pub async fn start(self) -> AuthResult<LoopbackServerHandle> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        info!(port, "loopback redirect receiver listening");

        let hub = self.hub;
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((mut socket, _)) => {
                        let hub = hub.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(&mut socket, port, &hub).await {
                                error!("loopback connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("loopback accept error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(LoopbackServerHandle { port, task })
    }
}

/// Running receiver; dropping it stops the server.
pub struct LoopbackServerHandle {
    port: u16,
    task: tokio::task::JoinHandle<()>,
}

impl LoopbackServerHandle {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The redirect target to hand to the backend.
    pub fn redirect_target(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port, CALLBACK_PATH)
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for LoopbackServerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle_connection(
    socket: &mut tokio::net::TcpStream,
    port: u16,
    hub: &DeepLinkHub,
) -> AuthResult<()> {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    debug!(request = %request_line.trim(), "loopback request");

    // Request line: GET /auth-callback?... HTTP/1.1
    if !request_line.starts_with("GET ") {
        send_response(&mut writer, 405, "Method Not Allowed", "Method Not Allowed").await?;
        return Ok(());
    }

    let path_end = request_line.find(" HTTP/").unwrap_or(request_line.len());
    let path = request_line[4..path_end].trim();

    if !path.starts_with(CALLBACK_PATH) {
        send_response(&mut writer, 404, "Not Found", "Not Found").await?;
        return Ok(());
    }

    let raw_url = format!("http://127.0.0.1:{}{}", port, path);

    // Page choice is cosmetic; the session judges the payload for itself.
    let body = match parse_redirect_url(&raw_url) {
        Ok(_) => success_page(),
        Err(e) => error_page(&e.to_string()),
    };
    send_response(&mut writer, 200, "OK", &body).await?;

    hub.publish(raw_url);
    Ok(())
}

async fn send_response(
    writer: &mut tokio::net::tcp::WriteHalf<'_>,
    status_code: u16,
    status_text: &str,
    body: &str,
) -> AuthResult<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_code,
        status_text,
        body.len(),
        body
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

fn success_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>PublicFix - Sign-in Successful</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px; background: #f5f5f5;">
<div style="max-width: 400px; margin: 0 auto; background: white; padding: 40px; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1);">
<h1 style="color: #22c55e; margin-bottom: 20px;">Sign-in Successful!</h1>
<p style="color: #666;">You can close this window and return to PublicFix.</p>
</div>
<script>setTimeout(() => window.close(), 2000);</script>
</body>
</html>"#
        .to_string()
}

fn error_page(error: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>PublicFix - Sign-in Failed</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px; background: #f5f5f5;">
<div style="max-width: 400px; margin: 0 auto; background: white; padding: 40px; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1);">
<h1 style="color: #ef4444; margin-bottom: 20px;">Sign-in Failed</h1>
<p style="color: #666;">Error: {}</p>
<p style="color: #888; font-size: 14px;">You can close this window and try again.</p>
</div>
</body>
</html>"#,
        error
    )
}
