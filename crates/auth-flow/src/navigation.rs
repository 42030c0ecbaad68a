//! Terminal-outcome to screen mapping.

use crate::controller::SignInOutcome;

/// Client screens the sign-in flow can land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Authenticated home screen.
    Home,
    /// Sign-in screen; `surface_error` asks it to show a failure notice.
    SignIn { surface_error: bool },
}

/// Abstraction over the client's navigation surface.
///
/// The flow calls this exactly once per sign-in attempt, with the screen for
/// the attempt's terminal outcome.
pub trait Navigator: Send + Sync {
    fn navigate(&self, screen: Screen);
}

/// Map a terminal sign-in outcome to its destination screen.
///
/// Resolution lands on home. Cancellation returns to sign-in without an
/// error notice; failure returns to sign-in with one.
pub fn resolve_destination(outcome: &SignInOutcome) -> Screen {
    match outcome {
        SignInOutcome::Resolved(_) => Screen::Home,
        SignInOutcome::Cancelled => Screen::SignIn {
            surface_error: false,
        },
        SignInOutcome::Failed(_) => Screen::SignIn {
            surface_error: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::SignInFailure;
    use credential_store::StoredCredential;
    use std::sync::Mutex;

    struct RecordingNavigator {
        visited: Mutex<Vec<Screen>>,
    }

    impl RecordingNavigator {
        fn new() -> Self {
            Self {
                visited: Mutex::new(Vec::new()),
            }
        }
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, screen: Screen) {
            self.visited.lock().unwrap().push(screen);
        }
    }

    #[test]
    fn test_resolved_goes_home() {
        let outcome = SignInOutcome::Resolved(StoredCredential {
            token: "abc123".to_string(),
            profile: None,
        });
        assert_eq!(resolve_destination(&outcome), Screen::Home);
    }

    #[test]
    fn test_cancelled_returns_to_sign_in_quietly() {
        assert_eq!(
            resolve_destination(&SignInOutcome::Cancelled),
            Screen::SignIn {
                surface_error: false
            }
        );
    }

    #[test]
    fn test_failed_returns_to_sign_in_with_notice() {
        for failure in [
            SignInFailure::Timeout,
            SignInFailure::Storage("disk full".to_string()),
            SignInFailure::MissingToken,
            SignInFailure::NoPayload,
        ] {
            assert_eq!(
                resolve_destination(&SignInOutcome::Failed(failure)),
                Screen::SignIn {
                    surface_error: true
                }
            );
        }
    }

    #[test]
    fn test_recording_navigator_observes_screens() {
        let navigator = RecordingNavigator::new();
        navigator.navigate(Screen::Home);
        navigator.navigate(Screen::SignIn {
            surface_error: true,
        });

        let visited = navigator.visited.lock().unwrap();
        assert_eq!(
            *visited,
            vec![
                Screen::Home,
                Screen::SignIn {
                    surface_error: true
                }
            ]
        );
    }
}
