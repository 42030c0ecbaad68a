//! Deep-link event delivery.
//!
//! Bridges the platform's "app opened via URL" notifications into
//! [`DeepLinkEvent`] values, covering both the URL that launched a
//! cold-started process and URLs delivered while the process is running.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// An OS-delivered URL open.
#[derive(Debug, Clone, PartialEq)]
pub struct DeepLinkEvent {
    /// The URL exactly as delivered
    pub raw_url: String,
    /// When the event was observed
    pub received_at: DateTime<Utc>,
}

impl DeepLinkEvent {
    pub fn new(raw_url: impl Into<String>) -> Self {
        Self {
            raw_url: raw_url.into(),
            received_at: Utc::now(),
        }
    }
}

#[derive(Default)]
struct HubInner {
    /// URL the process was launched with, replayed once to the next subscriber
    launch_url: Option<String>,
    /// At most one armed subscriber: one sign-in session at a time
    subscriber: Option<mpsc::UnboundedSender<DeepLinkEvent>>,
}

/// Fan-in point for inbound app URLs.
///
/// Producers (the OS bridge, the loopback receiver) publish raw URLs; the
/// active sign-in session subscribes. Events published while no session is
/// armed are dropped.
#[derive(Clone, Default)]
pub struct DeepLinkHub {
    inner: Arc<Mutex<HubInner>>,
}

impl DeepLinkHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the URL the process was launched with. Delivered as the first
    /// event of the next subscription, exactly once.
    pub fn record_launch_url(&self, raw_url: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        inner.launch_url = Some(raw_url.into());
    }

    /// Publish a URL delivered while the process is running.
    pub fn publish(&self, raw_url: impl Into<String>) {
        let event = DeepLinkEvent::new(raw_url);
        let mut inner = self.inner.lock().unwrap();
        match &inner.subscriber {
            Some(tx) => {
                if tx.send(event).is_err() {
                    // Receiver side went away without disarming.
                    inner.subscriber = None;
                }
            }
            None => {
                debug!(url = %event.raw_url, "no active sign-in session, dropping deep link");
            }
        }
    }

    /// Arm the subscription, replacing any previous one. A recorded launch
    /// URL is replayed immediately and then cleared.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<DeepLinkEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap();
        if let Some(raw_url) = inner.launch_url.take() {
            let _ = tx.send(DeepLinkEvent::new(raw_url));
        }
        inner.subscriber = Some(tx);
        rx
    }

    /// Disarm the subscription so a late redirect cannot reach an abandoned
    /// session.
    pub fn disarm(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.subscriber = None;
    }
}
