//! Pure state machine for one publish attempt
//!
//! No I/O and no async: the pipeline order and its failure policy live
//! here as a deterministic `transition(state, event) -> state` function,
//! so the sequencing rules are testable without a browser. The engine
//! performs the step each state names and feeds the result back in as an
//! event.

use plume_core::ErrorKind;

/// Where a publish attempt currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// Attempt opened, nothing done yet
    Init,
    /// Verifying the session is logged in
    Authenticating,
    /// Attaching media and waiting for ingestion
    Uploading,
    /// Filling title and body
    FillingContent,
    /// Appending hashtags
    TaggingContent,
    /// Setting comment and cross-post toggles
    ConfiguringOptions,
    /// Clicking publish and waiting for a verdict
    Submitting,
    /// Platform confirmed the post
    VerifiedSuccess,
    /// Attempt is over and did not produce a confirmed post
    VerifiedFailed { kind: ErrorKind },
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::VerifiedSuccess | State::VerifiedFailed { .. })
    }
}

/// Result of executing the step the current state names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StepSucceeded,
    StepFailed { kind: ErrorKind },
}

/// Advance the attempt. Deterministic, never panics.
///
/// Failure policy: option toggles are cosmetic, so a failure there falls
/// through to submission; a failure anywhere else ends the attempt with
/// the step's error kind. Terminal states absorb all further events.
pub fn transition(state: State, event: Event) -> State {
    match (state, event) {
        (State::Init, Event::StepSucceeded) => State::Authenticating,
        (State::Authenticating, Event::StepSucceeded) => State::Uploading,
        (State::Uploading, Event::StepSucceeded) => State::FillingContent,
        (State::FillingContent, Event::StepSucceeded) => State::TaggingContent,
        (State::TaggingContent, Event::StepSucceeded) => State::ConfiguringOptions,
        (State::ConfiguringOptions, Event::StepSucceeded) => State::Submitting,
        (State::ConfiguringOptions, Event::StepFailed { .. }) => State::Submitting,
        (State::Submitting, Event::StepSucceeded) => State::VerifiedSuccess,

        (state @ (State::VerifiedSuccess | State::VerifiedFailed { .. }), _) => state,

        (_, Event::StepFailed { kind }) => State::VerifiedFailed { kind },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(kind: ErrorKind) -> Event {
        Event::StepFailed { kind }
    }

    #[test]
    fn test_happy_path_order() {
        let mut state = State::Init;
        let expected = [
            State::Authenticating,
            State::Uploading,
            State::FillingContent,
            State::TaggingContent,
            State::ConfiguringOptions,
            State::Submitting,
            State::VerifiedSuccess,
        ];
        for want in expected {
            state = transition(state, Event::StepSucceeded);
            assert_eq!(state, want);
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn test_step_failure_ends_the_attempt_with_its_kind() {
        let state = transition(State::Uploading, failed(ErrorKind::UploadTimeout));
        assert_eq!(
            state,
            State::VerifiedFailed {
                kind: ErrorKind::UploadTimeout
            }
        );
        assert!(state.is_terminal());
    }

    #[test]
    fn test_options_failure_falls_through_to_submission() {
        let state = transition(
            State::ConfiguringOptions,
            failed(ErrorKind::ElementNotFound),
        );
        assert_eq!(state, State::Submitting);
    }

    #[test]
    fn test_auth_failure_never_reaches_upload() {
        let state = transition(State::Authenticating, failed(ErrorKind::AuthenticationTimeout));
        assert_eq!(
            state,
            State::VerifiedFailed {
                kind: ErrorKind::AuthenticationTimeout
            }
        );
    }

    #[test]
    fn test_terminal_states_absorb_events() {
        assert_eq!(
            transition(State::VerifiedSuccess, failed(ErrorKind::Internal)),
            State::VerifiedSuccess
        );
        let failed_state = State::VerifiedFailed {
            kind: ErrorKind::PlatformRejected,
        };
        assert_eq!(
            transition(failed_state.clone(), Event::StepSucceeded),
            failed_state
        );
    }
}
