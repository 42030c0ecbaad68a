//! Sign-in session controller.
//!
//! Orchestrates one browser-delegated sign-in attempt: launches the browser
//! session, listens for the auth redirect, races the two against each other
//! and a deadline, persists the winning credential exactly once, and reports
//! a single terminal outcome.
//!
//! The credential can reach the session through two channels at once (the
//! browser returning with the redirect URL, and the OS delivering the same
//! URL as a deep link). A single-claim resolution gate guarantees that only
//! the first usable payload is persisted; the loser finds the gate already
//! claimed and does nothing.

use crate::callback::{matches_redirect_target, parse_redirect_url, AuthPayload, CallbackError};
use crate::deep_link::DeepLinkHub;
use crate::error::{AuthError, AuthResult};
use crate::navigation::{resolve_destination, Navigator};
use crate::session_fsm::{SessionStatus, SignInInput, SignInMachine};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use credential_store::{CredentialStore, ProfileWrite, StoredCredential};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default sign-in session deadline.
pub const DEFAULT_SIGN_IN_TIMEOUT_SECS: u64 = 180;

/// How the browser session ended, as observed by the launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserOutcome {
    /// The browser delivered the redirect URL directly.
    Redirect(String),
    /// The user explicitly dismissed the browser surface.
    Dismissed,
    /// The browser surface closed without delivering a result; the redirect
    /// may still arrive out of band.
    Closed,
}

/// Abstraction over the platform's browser-based auth surface.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Open `auth_url` and block until the surface ends.
    async fn open(&self, auth_url: &str, redirect_target: &str) -> AuthResult<BrowserOutcome>;
}

/// Why a sign-in attempt failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignInFailure {
    #[error("Sign-in timed out")]
    Timeout,

    #[error("Could not persist the credential: {0}")]
    Storage(String),

    #[error("The redirect payload is missing the token")]
    MissingToken,

    #[error("The redirect carried no auth payload")]
    NoPayload,

    #[error("The browser session failed: {0}")]
    Browser(String),
}

impl From<CallbackError> for SignInFailure {
    fn from(err: CallbackError) -> Self {
        match err {
            CallbackError::NoPayload => SignInFailure::NoPayload,
            CallbackError::MissingToken => SignInFailure::MissingToken,
        }
    }
}

/// Terminal outcome of one sign-in attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SignInOutcome {
    /// A credential was parsed and persisted.
    Resolved(StoredCredential),
    /// The user backed out; not an error, nothing was persisted.
    Cancelled,
    /// The attempt failed.
    Failed(SignInFailure),
}

/// Configuration for a sign-in attempt.
#[derive(Debug, Clone)]
pub struct SignInOptions {
    /// Backend base URL, e.g. `https://publicfix-backend.vercel.app`
    pub backend_url: String,
    /// Redirect target the backend sends the browser back to,
    /// e.g. `publicfix://auth-callback`
    pub redirect_target: String,
    /// Session deadline; hitting it fails the attempt
    pub timeout: Duration,
}

impl SignInOptions {
    pub fn new(backend_url: impl Into<String>, redirect_target: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            redirect_target: redirect_target.into(),
            timeout: Duration::from_secs(DEFAULT_SIGN_IN_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The backend URL the browser is pointed at to start the flow.
    pub fn auth_url(&self) -> String {
        format!(
            "{}/api/auth/google?redirectUrl={}",
            self.backend_url.trim_end_matches('/'),
            crate::callback::encode_query_component(&self.redirect_target)
        )
    }
}

struct ActiveSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    status: SessionStatus,
    cancel: Arc<Notify>,
}

/// What the browser task reports when it did not win the resolution gate.
enum BrowserSignal {
    Dismissed,
    Closed,
    Unusable(CallbackError),
    LaunchFailed(String),
}

/// Orchestrates browser-delegated sign-in attempts, one at a time.
pub struct SignInController {
    options: SignInOptions,
    store: Arc<CredentialStore>,
    hub: DeepLinkHub,
    browser: Arc<dyn BrowserSession>,
    navigator: Arc<dyn Navigator>,
    session: Mutex<Option<ActiveSession>>,
}

impl SignInController {
    pub fn new(
        options: SignInOptions,
        store: Arc<CredentialStore>,
        hub: DeepLinkHub,
        browser: Arc<dyn BrowserSession>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            options,
            store,
            hub,
            browser,
            navigator,
            session: Mutex::new(None),
        }
    }

    /// Current session status; `Idle` when no attempt is active.
    pub fn status(&self) -> SessionStatus {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(SessionStatus::Idle)
    }

    /// Request cancellation of the active attempt. No-op when idle.
    pub fn cancel(&self) {
        let session = self.session.lock().unwrap();
        match session.as_ref() {
            Some(active) => {
                info!(session_id = %active.id, "cancelling sign-in session");
                active.cancel.notify_one();
            }
            None => debug!("cancel requested with no active sign-in session"),
        }
    }

    /// Run one sign-in attempt to its terminal outcome.
    ///
    /// Returns `Err(SignInInProgress)` if an attempt is already active.
    /// Every other path, including timeout and cancellation, completes with
    /// `Ok(outcome)` and exactly one navigation call.
    pub async fn sign_in(&self) -> AuthResult<SignInOutcome> {
        let mut machine = SignInMachine::new();
        let cancel = Arc::new(Notify::new());
        let session_id = Uuid::new_v4();

        {
            let mut session = self.session.lock().unwrap();
            if session.as_ref().is_some_and(|s| s.status.is_active()) {
                return Err(AuthError::SignInInProgress);
            }
            self.advance(&mut machine, &SignInInput::StartSignIn)?;
            *session = Some(ActiveSession {
                id: session_id,
                started_at: Utc::now(),
                status: SessionStatus::from(machine.state()),
                cancel: Arc::clone(&cancel),
            });
        }

        info!(session_id = %session_id, auth_url = %self.options.auth_url(), "starting sign-in session");

        // Single-claim resolution gate: the first usable payload takes the
        // sender, everyone after finds it gone.
        let (gate_tx, mut gate_rx) = oneshot::channel::<AuthPayload>();
        let gate = Arc::new(Mutex::new(Some(gate_tx)));

        let (browser_tx, mut browser_rx) = oneshot::channel::<BrowserSignal>();
        let browser_task = self.spawn_browser_task(Arc::clone(&gate), browser_tx);
        let deep_link_task = self.spawn_deep_link_task(Arc::clone(&gate));

        let deadline = tokio::time::sleep(self.options.timeout);
        tokio::pin!(deadline);
        let mut browser_pending = true;

        let outcome = loop {
            tokio::select! {
                // The gate arm goes first: a payload that already won the
                // race must be persisted even when another branch became
                // ready in the same poll.
                biased;

                payload = &mut gate_rx => {
                    break match payload {
                        Ok(payload) => self.persist(&mut machine, payload)?,
                        Err(_) => {
                            // Both producers died without claiming the gate.
                            self.advance(&mut machine, &SignInInput::BrowserFailed)?;
                            SignInOutcome::Failed(SignInFailure::Browser(
                                "sign-in session ended without a result".to_string(),
                            ))
                        }
                    };
                }
                signal = &mut browser_rx, if browser_pending => {
                    browser_pending = false;
                    match signal {
                        Ok(BrowserSignal::Closed) => {
                            // The redirect may have been handled out of band
                            // before the browser reported back.
                            if let Some(credential) = self.stored_credential() {
                                self.advance(&mut machine, &SignInInput::CredentialPersisted)?;
                                break SignInOutcome::Resolved(credential);
                            }
                            self.advance(&mut machine, &SignInInput::BrowserClosed)?;
                            self.set_status(SessionStatus::from(machine.state()));
                        }
                        Ok(BrowserSignal::Dismissed) => {
                            // A payload that already claimed the gate
                            // outranks the dismissal, as does a credential
                            // persisted out of band.
                            if let Some(payload) = close_gate(&gate, &mut gate_rx) {
                                break self.persist(&mut machine, payload)?;
                            }
                            if let Some(credential) = self.stored_credential() {
                                self.advance(&mut machine, &SignInInput::CredentialPersisted)?;
                                break SignInOutcome::Resolved(credential);
                            }
                            self.advance(&mut machine, &SignInInput::BrowserDismissed)?;
                            break SignInOutcome::Cancelled;
                        }
                        Ok(BrowserSignal::Unusable(err)) => {
                            // The deep link may have delivered a usable
                            // payload even though the browser's copy was not.
                            if let Some(payload) = close_gate(&gate, &mut gate_rx) {
                                break self.persist(&mut machine, payload)?;
                            }
                            self.advance(&mut machine, &SignInInput::BrowserClosed)?;
                            self.advance(&mut machine, &SignInInput::NoUsablePayload)?;
                            break SignInOutcome::Failed(err.into());
                        }
                        Ok(BrowserSignal::LaunchFailed(message)) => {
                            self.advance(&mut machine, &SignInInput::BrowserFailed)?;
                            break SignInOutcome::Failed(SignInFailure::Browser(message));
                        }
                        Err(_) => {
                            // Browser task panicked or was dropped; keep
                            // waiting for the redirect until the deadline.
                            warn!(session_id = %session_id, "browser task ended without a signal");
                            self.advance(&mut machine, &SignInInput::BrowserClosed)?;
                            self.set_status(SessionStatus::from(machine.state()));
                        }
                    }
                }
                _ = cancel.notified() => {
                    self.advance(&mut machine, &SignInInput::CancelRequested)?;
                    break SignInOutcome::Cancelled;
                }
                _ = &mut deadline => {
                    warn!(session_id = %session_id, "sign-in session timed out");
                    self.advance(&mut machine, &SignInInput::TimedOut)?;
                    break SignInOutcome::Failed(SignInFailure::Timeout);
                }
            }
        };

        // A late redirect must not reach an abandoned session.
        self.hub.disarm();
        browser_task.abort();
        deep_link_task.abort();

        self.set_status(SessionStatus::from(machine.state()));
        self.navigator.navigate(resolve_destination(&outcome));

        self.advance(&mut machine, &SignInInput::Acknowledged)?;
        *self.session.lock().unwrap() = None;

        info!(session_id = %session_id, outcome = ?outcome_kind(&outcome), "sign-in session finished");
        Ok(outcome)
    }

    /// Persist the gate-winning payload; a storage fault fails the attempt
    /// instead of leaving a half-written credential claim.
    fn persist(
        &self,
        machine: &mut SignInMachine,
        payload: AuthPayload,
    ) -> AuthResult<SignInOutcome> {
        let profile_write = match payload.profile.clone() {
            Some(profile) => ProfileWrite::Set(profile),
            None => ProfileWrite::Keep,
        };

        match self.store.put(&payload.token, profile_write) {
            Ok(()) => {
                self.advance(machine, &SignInInput::CredentialPersisted)?;
                Ok(SignInOutcome::Resolved(StoredCredential {
                    token: payload.token,
                    profile: payload.profile,
                }))
            }
            Err(e) => {
                warn!("credential persistence failed: {}", e);
                self.advance(machine, &SignInInput::PersistFailed)?;
                Ok(SignInOutcome::Failed(SignInFailure::Storage(e.to_string())))
            }
        }
    }

    fn spawn_browser_task(
        &self,
        gate: Arc<Mutex<Option<oneshot::Sender<AuthPayload>>>>,
        signal_tx: oneshot::Sender<BrowserSignal>,
    ) -> tokio::task::JoinHandle<()> {
        let browser = Arc::clone(&self.browser);
        let auth_url = self.options.auth_url();
        let redirect_target = self.options.redirect_target.clone();

        tokio::spawn(async move {
            let signal = match browser.open(&auth_url, &redirect_target).await {
                Ok(BrowserOutcome::Redirect(raw_url)) => match parse_redirect_url(&raw_url) {
                    Ok(payload) => {
                        // Claim and deliver under the gate lock so a closed
                        // gate always implies a delivered payload.
                        let mut slot = gate.lock().unwrap();
                        match slot.take() {
                            Some(tx) => {
                                let _ = tx.send(payload);
                            }
                            None => debug!("browser redirect lost the resolution race"),
                        }
                        return;
                    }
                    Err(err) => BrowserSignal::Unusable(err),
                },
                Ok(BrowserOutcome::Dismissed) => BrowserSignal::Dismissed,
                Ok(BrowserOutcome::Closed) => BrowserSignal::Closed,
                Err(e) => BrowserSignal::LaunchFailed(e.to_string()),
            };
            let _ = signal_tx.send(signal);
        })
    }

    fn spawn_deep_link_task(
        &self,
        gate: Arc<Mutex<Option<oneshot::Sender<AuthPayload>>>>,
    ) -> tokio::task::JoinHandle<()> {
        let mut events = self.hub.subscribe();
        let target = self.options.redirect_target.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !matches_redirect_target(&event.raw_url, &target) {
                    debug!(url = %event.raw_url, "ignoring unrelated deep link");
                    continue;
                }
                match parse_redirect_url(&event.raw_url) {
                    Ok(payload) => {
                        // Claim and deliver under the gate lock so a closed
                        // gate always implies a delivered payload.
                        let mut slot = gate.lock().unwrap();
                        match slot.take() {
                            Some(tx) => {
                                let _ = tx.send(payload);
                            }
                            None => {
                                debug!(url = %event.raw_url, "deep link lost the resolution race");
                            }
                        }
                        break;
                    }
                    Err(err) => {
                        // Keep listening: a garbled delivery must not eat the
                        // real redirect that may still follow.
                        warn!(url = %event.raw_url, "redirect deep link had no usable payload: {}", err);
                    }
                }
            }
        })
    }

    fn advance(&self, machine: &mut SignInMachine, input: &SignInInput) -> AuthResult<()> {
        machine.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "{:?} in state {:?}",
                input,
                machine.state()
            ))
        })?;
        Ok(())
    }

    /// Read the stored credential, treating a storage read fault as absence
    /// so a flaky read cannot wedge the session loop.
    fn stored_credential(&self) -> Option<StoredCredential> {
        match self.store.get() {
            Ok(credential) => credential,
            Err(e) => {
                warn!("credential read failed during sign-in: {}", e);
                None
            }
        }
    }

    fn set_status(&self, status: SessionStatus) {
        if let Some(active) = self.session.lock().unwrap().as_mut() {
            active.status = status;
        }
    }

    /// When the active session started, if any.
    pub fn session_started_at(&self) -> Option<DateTime<Utc>> {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.started_at)
    }
}

/// Close the resolution gate, recovering a payload that already won it.
///
/// Producers claim the sender and send while holding the gate lock, so once
/// the sender is gone the payload is guaranteed to be sitting in the
/// receiver. Taking the sender here means no payload can arrive later.
fn close_gate(
    gate: &Arc<Mutex<Option<oneshot::Sender<AuthPayload>>>>,
    gate_rx: &mut oneshot::Receiver<AuthPayload>,
) -> Option<AuthPayload> {
    if gate.lock().unwrap().take().is_some() {
        return None;
    }
    gate_rx.try_recv().ok()
}

fn outcome_kind(outcome: &SignInOutcome) -> &'static str {
    match outcome {
        SignInOutcome::Resolved(_) => "resolved",
        SignInOutcome::Cancelled => "cancelled",
        SignInOutcome::Failed(_) => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::Screen;
    use credential_store::{
        CredentialStorage, MemoryStorage, StorageError, StorageKeys, StorageResult, UserProfile,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Browser fake driven by the test: signals when opened, then waits for
    /// the scripted outcome.
    struct FakeBrowser {
        opened_tx: Mutex<Option<oneshot::Sender<()>>>,
        outcome_rx: Mutex<Option<oneshot::Receiver<AuthResult<BrowserOutcome>>>>,
    }

    #[async_trait]
    impl BrowserSession for FakeBrowser {
        async fn open(&self, _auth_url: &str, _redirect_target: &str) -> AuthResult<BrowserOutcome> {
            if let Some(tx) = self.opened_tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
            let rx = self.outcome_rx.lock().unwrap().take();
            match rx {
                Some(rx) => match rx.await {
                    Ok(outcome) => outcome,
                    // Script sender dropped: behave like a never-returning
                    // browser until the task is aborted.
                    Err(_) => std::future::pending().await,
                },
                None => Ok(BrowserOutcome::Closed),
            }
        }
    }

    /// Handles to drive a [`FakeBrowser`] from the test body.
    struct BrowserScript {
        opened: oneshot::Receiver<()>,
        outcome: oneshot::Sender<AuthResult<BrowserOutcome>>,
    }

    fn scripted_browser() -> (Arc<FakeBrowser>, BrowserScript) {
        let (opened_tx, opened_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let browser = Arc::new(FakeBrowser {
            opened_tx: Mutex::new(Some(opened_tx)),
            outcome_rx: Mutex::new(Some(outcome_rx)),
        });
        (
            browser,
            BrowserScript {
                opened: opened_rx,
                outcome: outcome_tx,
            },
        )
    }

    struct RecordingNavigator {
        visited: Mutex<Vec<Screen>>,
    }

    impl RecordingNavigator {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                visited: Mutex::new(Vec::new()),
            })
        }

        fn visited(&self) -> Vec<Screen> {
            self.visited.lock().unwrap().clone()
        }
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, screen: Screen) {
            self.visited.lock().unwrap().push(screen);
        }
    }

    /// Counts token writes to prove exactly-once persistence.
    struct CountingStorage {
        inner: MemoryStorage,
        token_writes: AtomicUsize,
    }

    impl CountingStorage {
        fn new() -> Self {
            Self {
                inner: MemoryStorage::new(),
                token_writes: AtomicUsize::new(0),
            }
        }
    }

    impl CredentialStorage for CountingStorage {
        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            if key == StorageKeys::TOKEN {
                self.token_writes.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.set(key, value)
        }
        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            self.inner.get(key)
        }
        fn delete(&self, key: &str) -> StorageResult<bool> {
            self.inner.delete(key)
        }
    }

    /// Shares a [`CountingStorage`] with the test body while the store owns
    /// the box.
    struct SharedStorage(Arc<CountingStorage>);

    impl CredentialStorage for SharedStorage {
        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            self.0.set(key, value)
        }
        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            self.0.get(key)
        }
        fn delete(&self, key: &str) -> StorageResult<bool> {
            self.0.delete(key)
        }
    }

    struct FailingStorage;

    impl CredentialStorage for FailingStorage {
        fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::Unavailable("disk full".to_string()))
        }
        fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            Ok(None)
        }
        fn delete(&self, _key: &str) -> StorageResult<bool> {
            Ok(false)
        }
    }

    struct Harness {
        controller: Arc<SignInController>,
        hub: DeepLinkHub,
        navigator: Arc<RecordingNavigator>,
        store: Arc<CredentialStore>,
        script: BrowserScript,
    }

    fn harness_with_storage(storage: Box<dyn CredentialStorage>) -> Harness {
        let (browser, script) = scripted_browser();
        let hub = DeepLinkHub::new();
        let navigator = RecordingNavigator::new();
        let store = Arc::new(CredentialStore::new(storage));
        let options = SignInOptions::new(
            "https://publicfix-backend.vercel.app",
            "publicfix://auth-callback",
        )
        .with_timeout(Duration::from_secs(5));
        let controller = Arc::new(SignInController::new(
            options,
            Arc::clone(&store),
            hub.clone(),
            browser,
            navigator.clone(),
        ));
        Harness {
            controller,
            hub,
            navigator,
            store,
            script,
        }
    }

    fn harness() -> Harness {
        harness_with_storage(Box::new(MemoryStorage::new()))
    }

    const REDIRECT: &str =
        "publicfix://auth-callback?token=abc123&userData=%7B%22name%22%3A%22X%22%7D";

    #[tokio::test]
    async fn test_dismissal_cancels_without_persisting() {
        let h = harness();
        let controller = Arc::clone(&h.controller);
        let run = tokio::spawn(async move { controller.sign_in().await });

        h.script.opened.await.unwrap();
        h.script.outcome.send(Ok(BrowserOutcome::Dismissed)).unwrap();

        let outcome = run.await.unwrap().unwrap();
        assert_eq!(outcome, SignInOutcome::Cancelled);
        assert!(h.store.get().unwrap().is_none());
        assert_eq!(
            h.navigator.visited(),
            vec![Screen::SignIn {
                surface_error: false
            }]
        );
    }

    #[tokio::test]
    async fn test_deep_link_resolves_and_persists() {
        let h = harness();
        let controller = Arc::clone(&h.controller);
        let run = tokio::spawn(async move { controller.sign_in().await });

        // Browser stays open; the redirect arrives as a deep link.
        h.script.opened.await.unwrap();
        h.hub.publish(REDIRECT);

        let outcome = run.await.unwrap().unwrap();
        let SignInOutcome::Resolved(credential) = outcome else {
            panic!("expected resolution, got {:?}", outcome);
        };
        assert_eq!(credential.token, "abc123");
        assert_eq!(
            credential.profile,
            Some(UserProfile::Structured(json!({"name": "X"})))
        );

        let stored = h.store.get().unwrap().unwrap();
        assert_eq!(stored.token, "abc123");
        assert_eq!(h.navigator.visited(), vec![Screen::Home]);
        assert_eq!(h.controller.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn test_browser_redirect_resolves_and_persists() {
        let h = harness();
        let controller = Arc::clone(&h.controller);
        let run = tokio::spawn(async move { controller.sign_in().await });

        h.script.opened.await.unwrap();
        h.script
            .outcome
            .send(Ok(BrowserOutcome::Redirect(REDIRECT.to_string())))
            .unwrap();

        let outcome = run.await.unwrap().unwrap();
        assert!(matches!(outcome, SignInOutcome::Resolved(_)));
        assert!(h.store.get().unwrap().is_some());
        assert_eq!(h.navigator.visited(), vec![Screen::Home]);
    }

    #[tokio::test]
    async fn test_both_channels_persist_exactly_once() {
        let counting = Arc::new(CountingStorage::new());
        let (browser, script) = scripted_browser();
        let hub = DeepLinkHub::new();
        let store = Arc::new(CredentialStore::new(Box::new(SharedStorage(Arc::clone(
            &counting,
        )))));
        let navigator = RecordingNavigator::new();
        let controller = Arc::new(SignInController::new(
            SignInOptions::new(
                "https://publicfix-backend.vercel.app",
                "publicfix://auth-callback",
            )
            .with_timeout(Duration::from_secs(5)),
            Arc::clone(&store),
            hub.clone(),
            browser,
            navigator.clone(),
        ));

        let runner = Arc::clone(&controller);
        let run = tokio::spawn(async move { runner.sign_in().await });

        // Deliver the same credential through both channels at once.
        script.opened.await.unwrap();
        hub.publish(REDIRECT);
        script
            .outcome
            .send(Ok(BrowserOutcome::Redirect(REDIRECT.to_string())))
            .unwrap();

        let outcome = run.await.unwrap().unwrap();
        assert!(matches!(outcome, SignInOutcome::Resolved(_)));
        assert_eq!(counting.token_writes.load(Ordering::SeqCst), 1);
        assert_eq!(navigator.visited(), vec![Screen::Home]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dismissal_racing_deep_link_keeps_token() {
        // A dismissal arriving right behind a winning deep link must never
        // drop the token. Repeated because the loss was a scheduling race.
        for _ in 0..50 {
            let h = harness();
            let controller = Arc::clone(&h.controller);
            let run = tokio::spawn(async move { controller.sign_in().await });

            h.script.opened.await.unwrap();
            h.hub.publish(REDIRECT);
            // Let the deep link claim the gate, then dismiss immediately.
            tokio::time::sleep(Duration::from_millis(5)).await;
            // A failed send means the session already resolved via the deep
            // link before the dismissal arrived, which is the success case.
            let _ = h.script.outcome.send(Ok(BrowserOutcome::Dismissed));

            let outcome = run.await.unwrap().unwrap();
            let SignInOutcome::Resolved(credential) = outcome else {
                panic!("deep-link token was dropped: {:?}", outcome);
            };
            assert_eq!(credential.token, "abc123");
            assert_eq!(h.store.get().unwrap().unwrap().token, "abc123");
            assert_eq!(h.navigator.visited(), vec![Screen::Home]);
        }
    }

    #[tokio::test]
    async fn test_duplicate_deep_link_writes_once() {
        let counting = Arc::new(CountingStorage::new());
        let (browser, script) = scripted_browser();
        let hub = DeepLinkHub::new();
        let store = Arc::new(CredentialStore::new(Box::new(SharedStorage(Arc::clone(
            &counting,
        )))));
        let controller = Arc::new(SignInController::new(
            SignInOptions::new(
                "https://publicfix-backend.vercel.app",
                "publicfix://auth-callback",
            )
            .with_timeout(Duration::from_secs(5)),
            Arc::clone(&store),
            hub.clone(),
            browser,
            RecordingNavigator::new(),
        ));

        let runner = Arc::clone(&controller);
        let run = tokio::spawn(async move { runner.sign_in().await });

        // The OS fires the same redirect twice.
        script.opened.await.unwrap();
        hub.publish(REDIRECT);
        hub.publish(REDIRECT);

        let outcome = run.await.unwrap().unwrap();
        assert!(matches!(outcome, SignInOutcome::Resolved(_)));
        assert_eq!(counting.token_writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unstructured_user_data_kept_raw() {
        let h = harness();
        let controller = Arc::clone(&h.controller);
        let run = tokio::spawn(async move { controller.sign_in().await });

        h.script.opened.await.unwrap();
        h.hub
            .publish("publicfix://auth-callback?token=abc123&userData=not-json");

        let outcome = run.await.unwrap().unwrap();
        let SignInOutcome::Resolved(credential) = outcome else {
            panic!("expected resolution, got {:?}", outcome);
        };
        assert_eq!(
            credential.profile,
            Some(UserProfile::Opaque("not-json".to_string()))
        );
    }

    #[tokio::test]
    async fn test_stray_deep_links_ignored() {
        let h = harness();
        let controller = Arc::clone(&h.controller);
        let run = tokio::spawn(async move { controller.sign_in().await });

        h.script.opened.await.unwrap();
        h.hub.publish("publicfix://report?damage=pothole");
        h.hub.publish("https://example.com/unrelated");
        h.hub.publish(REDIRECT);

        let outcome = run.await.unwrap().unwrap();
        assert!(matches!(outcome, SignInOutcome::Resolved(_)));
    }

    #[tokio::test]
    async fn test_storage_failure_fails_session() {
        let h = harness_with_storage(Box::new(FailingStorage));
        let controller = Arc::clone(&h.controller);
        let run = tokio::spawn(async move { controller.sign_in().await });

        h.script.opened.await.unwrap();
        h.hub.publish(REDIRECT);

        let outcome = run.await.unwrap().unwrap();
        assert!(matches!(
            outcome,
            SignInOutcome::Failed(SignInFailure::Storage(_))
        ));
        // Failure returns to sign-in with an error notice, never home.
        assert_eq!(
            h.navigator.visited(),
            vec![Screen::SignIn {
                surface_error: true
            }]
        );
    }

    #[tokio::test]
    async fn test_timeout_fails_session() {
        let (browser, _script) = scripted_browser();
        let hub = DeepLinkHub::new();
        let navigator = RecordingNavigator::new();
        let store = Arc::new(CredentialStore::new(Box::new(MemoryStorage::new())));
        let controller = SignInController::new(
            SignInOptions::new(
                "https://publicfix-backend.vercel.app",
                "publicfix://auth-callback",
            )
            .with_timeout(Duration::from_millis(50)),
            store,
            hub,
            browser,
            navigator.clone(),
        );

        let outcome = controller.sign_in().await.unwrap();
        assert_eq!(outcome, SignInOutcome::Failed(SignInFailure::Timeout));
        assert_eq!(
            navigator.visited(),
            vec![Screen::SignIn {
                surface_error: true
            }]
        );
    }

    #[tokio::test]
    async fn test_concurrent_start_rejected() {
        let h = harness();
        let controller = Arc::clone(&h.controller);
        let run = tokio::spawn(async move { controller.sign_in().await });

        h.script.opened.await.unwrap();
        assert!(matches!(
            h.controller.sign_in().await,
            Err(AuthError::SignInInProgress)
        ));

        h.controller.cancel();
        let outcome = run.await.unwrap().unwrap();
        assert_eq!(outcome, SignInOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_mid_session_disarms_deep_links() {
        let h = harness();
        let controller = Arc::clone(&h.controller);
        let run = tokio::spawn(async move { controller.sign_in().await });

        h.script.opened.await.unwrap();
        h.controller.cancel();

        let outcome = run.await.unwrap().unwrap();
        assert_eq!(outcome, SignInOutcome::Cancelled);

        // A late redirect after cancellation must not persist anything.
        h.hub.publish(REDIRECT);
        tokio::task::yield_now().await;
        assert!(h.store.get().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_browser_closed_then_redirect_resolves() {
        let h = harness();
        let controller = Arc::clone(&h.controller);
        let run = tokio::spawn(async move { controller.sign_in().await });

        h.script.opened.await.unwrap();
        h.script.outcome.send(Ok(BrowserOutcome::Closed)).unwrap();
        h.hub.publish(REDIRECT);

        let outcome = run.await.unwrap().unwrap();
        assert!(matches!(outcome, SignInOutcome::Resolved(_)));
    }

    #[tokio::test]
    async fn test_browser_closed_with_credential_already_stored() {
        let h = harness();
        // Something persisted the credential before the browser reported back.
        h.store
            .put("abc123", ProfileWrite::Keep)
            .unwrap();

        let controller = Arc::clone(&h.controller);
        let run = tokio::spawn(async move { controller.sign_in().await });

        h.script.opened.await.unwrap();
        h.script.outcome.send(Ok(BrowserOutcome::Closed)).unwrap();

        let outcome = run.await.unwrap().unwrap();
        let SignInOutcome::Resolved(credential) = outcome else {
            panic!("expected resolution, got {:?}", outcome);
        };
        assert_eq!(credential.token, "abc123");
        assert_eq!(h.navigator.visited(), vec![Screen::Home]);
    }

    #[tokio::test]
    async fn test_unusable_browser_redirect_fails() {
        let h = harness();
        let controller = Arc::clone(&h.controller);
        let run = tokio::spawn(async move { controller.sign_in().await });

        h.script.opened.await.unwrap();
        h.script
            .outcome
            .send(Ok(BrowserOutcome::Redirect(
                "publicfix://auth-callback".to_string(),
            )))
            .unwrap();

        let outcome = run.await.unwrap().unwrap();
        assert_eq!(outcome, SignInOutcome::Failed(SignInFailure::NoPayload));
        assert!(h.store.get().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_browser_launch_failure_fails() {
        let h = harness();
        let controller = Arc::clone(&h.controller);
        let run = tokio::spawn(async move { controller.sign_in().await });

        h.script.opened.await.unwrap();
        h.script
            .outcome
            .send(Err(AuthError::Browser("no browser available".to_string())))
            .unwrap();

        let outcome = run.await.unwrap().unwrap();
        assert!(matches!(
            outcome,
            SignInOutcome::Failed(SignInFailure::Browser(_))
        ));
    }

    #[tokio::test]
    async fn test_fresh_attempt_after_terminal_outcome() {
        let h = harness();
        let controller = Arc::clone(&h.controller);
        let run = tokio::spawn(async move { controller.sign_in().await });

        h.script.opened.await.unwrap();
        h.script.outcome.send(Ok(BrowserOutcome::Dismissed)).unwrap();
        run.await.unwrap().unwrap();
        assert_eq!(h.controller.status(), SessionStatus::Idle);

        // The fake browser script is exhausted; the second open falls back
        // to an immediate close, then the session times out. Starting must
        // be permitted again either way.
        let controller = Arc::new(SignInController::new(
            SignInOptions::new(
                "https://publicfix-backend.vercel.app",
                "publicfix://auth-callback",
            )
            .with_timeout(Duration::from_millis(50)),
            Arc::clone(&h.store),
            h.hub.clone(),
            scripted_browser().0,
            RecordingNavigator::new(),
        ));
        assert!(controller.sign_in().await.is_ok());
    }

    #[test]
    fn test_auth_url_encodes_redirect_target() {
        let options = SignInOptions::new(
            "https://publicfix-backend.vercel.app/",
            "publicfix://auth-callback",
        );
        assert_eq!(
            options.auth_url(),
            "https://publicfix-backend.vercel.app/api/auth/google?redirectUrl=publicfix%3A%2F%2Fauth-callback"
        );
    }
}
