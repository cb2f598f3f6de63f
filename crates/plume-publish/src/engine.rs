//! Retrying publish engine
//!
//! Drives one attempt at a time through the pipeline state machine and
//! wraps it in retry, rejection-cap and overall-deadline policy. The
//! engine never returns an error: every publish call ends in a
//! [`PublishOutcome`], failed ones carrying the classification of the
//! last attempt's error.

use crate::backend::{AttemptHandle, PostRef, PublishBackend};
use crate::state::{transition, Event, State};
use plume_core::{ErrorKind, PlumeError, PublishOutcome, PublishRequest, PublishSettings};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

/// Platform verdicts are sticky: after this many rejections of the same
/// content the engine stops re-submitting it.
const REJECTION_CAP: u32 = 2;

pub struct PublishEngine<B: PublishBackend> {
    backend: B,
    settings: PublishSettings,
    /// Attempts touch one shared browser profile, so concurrent publish
    /// calls are serialized rather than interleaved.
    attempt_gate: Mutex<()>,
}

impl<B: PublishBackend> PublishEngine<B> {
    pub fn new(backend: B, settings: PublishSettings) -> Self {
        Self {
            backend,
            settings,
            attempt_gate: Mutex::new(()),
        }
    }

    /// Publish one request, retrying per configuration.
    ///
    /// Always returns an outcome. The attempt handle is closed after
    /// every attempt, whatever happened inside it.
    pub async fn publish(&self, request: &PublishRequest) -> PublishOutcome {
        if let Err(e) = request.validate() {
            warn!("Rejecting malformed request: {}", e);
            return PublishOutcome::failed(e.kind(), 0);
        }

        let _serialized = self.attempt_gate.lock().await;
        let deadline = Instant::now() + Duration::from_secs(self.settings.overall_timeout_secs);
        let retry_interval = Duration::from_secs(self.settings.retry_interval_secs);
        let max_attempts = self.settings.retry_count.max(1);

        let mut rejections = 0u32;
        let mut last_kind = ErrorKind::Internal;
        let mut attempts_used = 0u32;

        for attempt_no in 1..=max_attempts {
            attempts_used = attempt_no;
            info!(attempt = attempt_no, max = max_attempts, "Starting publish attempt");

            let result = self.run_one_attempt(request, deadline).await;

            match result {
                Ok(post) => {
                    info!(attempt = attempt_no, post_id = ?post.post_id, "Publish confirmed");
                    return PublishOutcome::success(post.post_id, post.post_url, attempt_no);
                }
                Err(e) => {
                    last_kind = e.kind();
                    warn!(attempt = attempt_no, kind = %last_kind, "Attempt failed: {}", e);

                    if last_kind == ErrorKind::PlatformRejected {
                        rejections += 1;
                        if rejections >= REJECTION_CAP {
                            warn!("Platform rejected the content repeatedly, giving up");
                            break;
                        }
                    }
                    if !e.is_retryable() {
                        break;
                    }
                }
            }

            if attempt_no == max_attempts {
                break;
            }
            let now = Instant::now();
            if now + retry_interval >= deadline {
                warn!("Overall deadline leaves no room for another attempt");
                break;
            }
            tokio::time::sleep(retry_interval).await;
        }

        PublishOutcome::failed(last_kind, attempts_used)
    }

    /// Publish several requests back to back, pausing between posts so
    /// the account does not trip burst limits. Failures do not stop the
    /// batch.
    pub async fn publish_batch(&self, requests: &[PublishRequest]) -> Vec<PublishOutcome> {
        let interval = Duration::from_secs(self.settings.post_interval_secs);
        let mut outcomes = Vec::with_capacity(requests.len());

        for (i, request) in requests.iter().enumerate() {
            if i > 0 {
                info!(secs = interval.as_secs(), "Waiting before next post");
                tokio::time::sleep(interval).await;
            }
            outcomes.push(self.publish(request).await);
        }

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        info!(total = outcomes.len(), succeeded, "Batch finished");
        outcomes
    }

    /// Open an attempt, run it under the overall deadline, and close it
    /// no matter how it ended.
    async fn run_one_attempt(
        &self,
        request: &PublishRequest,
        deadline: Instant,
    ) -> plume_core::Result<PostRef> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(PlumeError::Other("Overall publish deadline exhausted".into()));
        }

        let mut attempt = self.backend.open_attempt(&request.account_id).await?;

        let result = match tokio::time::timeout(remaining, run_pipeline(&mut attempt, request)).await
        {
            Ok(result) => result,
            Err(_) => Err(PlumeError::Other(
                "Publish attempt exceeded the overall deadline".into(),
            )),
        };

        if let Err(e) = attempt.close().await {
            warn!("Failed to close attempt cleanly: {}", e);
        }
        result
    }
}

/// Execute pipeline steps in the order the state machine dictates.
async fn run_pipeline<A: AttemptHandle>(
    attempt: &mut A,
    request: &PublishRequest,
) -> plume_core::Result<PostRef> {
    let mut state = transition(State::Init, Event::StepSucceeded);
    let mut last_err: Option<PlumeError> = None;
    let mut post = PostRef::default();

    while !state.is_terminal() {
        let step_result: plume_core::Result<()> = match &state {
            State::Authenticating => attempt.authenticate().await,
            State::Uploading => attempt.upload_media(&request.media_paths).await.map(|_| ()),
            State::FillingContent => attempt.fill_content(&request.title, &request.body).await,
            State::TaggingContent => attempt.append_hashtags(&request.hashtags).await,
            State::ConfiguringOptions => attempt.configure_options().await,
            State::Submitting => attempt.submit().await.map(|p| post = p),
            State::Init | State::VerifiedSuccess | State::VerifiedFailed { .. } => Ok(()),
        };

        let event = match step_result {
            Ok(()) => Event::StepSucceeded,
            Err(e) => {
                let kind = e.kind();
                last_err = Some(e);
                Event::StepFailed { kind }
            }
        };
        state = transition(state, event);
    }

    match state {
        State::VerifiedSuccess => Ok(post),
        State::VerifiedFailed { kind } => Err(last_err
            .unwrap_or_else(|| PlumeError::Other(format!("Attempt failed with {}", kind)))),
        _ => unreachable!("loop exits only on terminal states"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Authenticate,
        Upload,
        Fill,
        Tag,
        Options,
        Submit,
    }

    /// Per-attempt script: succeed fully, or fail at one step.
    #[derive(Debug, Clone)]
    enum Plan {
        Success,
        FailAt(Step, ErrorKind),
    }

    struct Counters {
        opened: AtomicU32,
        closed: AtomicU32,
        active: AtomicI32,
        max_active: AtomicI32,
    }

    impl Counters {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                opened: AtomicU32::new(0),
                closed: AtomicU32::new(0),
                active: AtomicI32::new(0),
                max_active: AtomicI32::new(0),
            })
        }
    }

    struct ScriptedBackend {
        plans: StdMutex<Vec<Plan>>,
        counters: Arc<Counters>,
    }

    impl ScriptedBackend {
        fn new(plans: Vec<Plan>) -> Self {
            Self {
                plans: StdMutex::new(plans),
                counters: Counters::new(),
            }
        }
    }

    struct ScriptedAttempt {
        plan: Plan,
        counters: Arc<Counters>,
    }

    impl ScriptedAttempt {
        fn step(&self, step: Step) -> plume_core::Result<()> {
            match &self.plan {
                Plan::FailAt(s, kind) if *s == step => Err(err_of(*kind)),
                _ => Ok(()),
            }
        }
    }

    fn err_of(kind: ErrorKind) -> PlumeError {
        match kind {
            ErrorKind::SessionUnavailable => PlumeError::Session("scripted".into()),
            ErrorKind::AuthenticationTimeout => PlumeError::AuthenticationTimeout("scripted".into()),
            ErrorKind::ElementNotFound => PlumeError::ElementNotFound("scripted".into()),
            ErrorKind::InjectionVerificationFailed => {
                PlumeError::InjectionVerification("scripted".into())
            }
            ErrorKind::UploadTimeout => PlumeError::UploadTimeout("scripted".into()),
            ErrorKind::UploadError => PlumeError::Upload("scripted".into()),
            ErrorKind::SubmitTimeout => PlumeError::SubmitTimeout("scripted".into()),
            ErrorKind::PlatformRejected => PlumeError::PlatformRejected("scripted".into()),
            ErrorKind::Internal => PlumeError::Other("scripted".into()),
        }
    }

    #[async_trait]
    impl AttemptHandle for ScriptedAttempt {
        async fn authenticate(&mut self) -> plume_core::Result<()> {
            self.step(Step::Authenticate)
        }
        async fn upload_media(&mut self, _paths: &[PathBuf]) -> plume_core::Result<usize> {
            self.step(Step::Upload).map(|_| 0)
        }
        async fn fill_content(&mut self, _title: &str, _body: &str) -> plume_core::Result<()> {
            self.step(Step::Fill)
        }
        async fn append_hashtags(&mut self, _tags: &[String]) -> plume_core::Result<()> {
            self.step(Step::Tag)
        }
        async fn configure_options(&mut self) -> plume_core::Result<()> {
            self.step(Step::Options)
        }
        async fn submit(&mut self) -> plume_core::Result<PostRef> {
            self.step(Step::Submit).map(|_| PostRef {
                post_id: Some("note123abc".into()),
                post_url: Some("https://example.com/explore/note123abc".into()),
            })
        }
        async fn close(&mut self) -> plume_core::Result<()> {
            self.counters.active.fetch_sub(1, Ordering::SeqCst);
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl PublishBackend for ScriptedBackend {
        type Attempt = ScriptedAttempt;

        async fn open_attempt(&self, _account_id: &str) -> plume_core::Result<ScriptedAttempt> {
            let plan = {
                let mut plans = self.plans.lock().unwrap();
                if plans.is_empty() {
                    Plan::Success
                } else {
                    plans.remove(0)
                }
            };
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters.max_active.fetch_max(active, Ordering::SeqCst);
            // Hold the attempt open across a yield so overlapping
            // publishes would be observable.
            tokio::task::yield_now().await;
            Ok(ScriptedAttempt {
                plan,
                counters: Arc::clone(&self.counters),
            })
        }
    }

    fn request() -> PublishRequest {
        PublishRequest {
            title: "Title".into(),
            body: "Body".into(),
            hashtags: vec!["travel".into()],
            media_paths: vec![],
            account_id: "default".into(),
        }
    }

    fn settings() -> PublishSettings {
        PublishSettings::default()
    }

    fn engine(plans: Vec<Plan>) -> PublishEngine<ScriptedBackend> {
        PublishEngine::new(ScriptedBackend::new(plans), settings())
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success() {
        let engine = engine(vec![Plan::Success]);
        let outcome = engine.publish(&request()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.post_id.as_deref(), Some("note123abc"));
        let counters = &engine.backend.counters;
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_third_attempt_succeeds() {
        let engine = engine(vec![
            Plan::FailAt(Step::Upload, ErrorKind::UploadTimeout),
            Plan::FailAt(Step::Submit, ErrorKind::SubmitTimeout),
            Plan::Success,
        ]);
        let outcome = engine.publish(&request()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 3);
        // Every attempt gets opened and closed, including the failed ones.
        let counters = &engine.backend.counters;
        assert_eq!(counters.opened.load(Ordering::SeqCst), 3);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_attempts_fail_reports_last_kind() {
        let engine = engine(vec![
            Plan::FailAt(Step::Authenticate, ErrorKind::AuthenticationTimeout),
            Plan::FailAt(Step::Upload, ErrorKind::UploadTimeout),
            Plan::FailAt(Step::Submit, ErrorKind::SubmitTimeout),
        ]);
        let outcome = engine.publish(&request()).await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.error_kind, Some(ErrorKind::SubmitTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_rejection_stops_early() {
        let engine = engine(vec![
            Plan::FailAt(Step::Submit, ErrorKind::PlatformRejected),
            Plan::FailAt(Step::Submit, ErrorKind::PlatformRejected),
            Plan::Success,
        ]);
        let outcome = engine.publish(&request()).await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.error_kind, Some(ErrorKind::PlatformRejected));
        // Third attempt never happens even though it would have succeeded.
        assert_eq!(outcome.attempts, 2);
        assert_eq!(engine.backend.counters.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_options_failure_does_not_fail_the_attempt() {
        let engine = engine(vec![Plan::FailAt(Step::Options, ErrorKind::ElementNotFound)]);
        let outcome = engine.publish(&request()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_request_opens_no_attempt() {
        let engine = engine(vec![Plan::Success]);
        let mut bad = request();
        bad.account_id = String::new();
        let outcome = engine.publish(&bad).await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts, 0);
        assert_eq!(engine.backend.counters.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_runs_sequentially_with_interval() {
        let engine = engine(vec![Plan::Success, Plan::Success]);
        let start = Instant::now();
        let outcomes = engine.publish_batch(&[request(), request()]).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.is_success()));
        // One inter-post pause for two posts.
        assert!(start.elapsed() >= Duration::from_secs(settings().post_interval_secs));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_continues_past_failures() {
        let engine = engine(vec![
            Plan::FailAt(Step::Submit, ErrorKind::PlatformRejected),
            Plan::FailAt(Step::Submit, ErrorKind::PlatformRejected),
            Plan::Success,
        ]);
        let outcomes = engine.publish_batch(&[request(), request()]).await;

        assert!(!outcomes[0].is_success());
        assert!(outcomes[1].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_publishes_are_serialized() {
        let engine = Arc::new(engine(vec![Plan::Success, Plan::Success]));
        let a = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.publish(&request()).await })
        };
        let b = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.publish(&request()).await })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(a.is_success() && b.is_success());
        assert_eq!(engine.backend.counters.max_active.load(Ordering::SeqCst), 1);
    }
}
