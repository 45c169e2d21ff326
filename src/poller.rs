//! The asynchronous-completion polling protocol.
//!
//! A [`Poller`] blocks the calling scenario until externally-performed work
//! becomes observably complete, reloading the observed page between attempts.
//! Each cycle runs observe → fatal check → success check → deadline check →
//! optional reindex → optional retry classification → sleep → reload. Every
//! invocation resolves to exactly one [`PollOutcome`]; malformed requests are
//! rejected before the first observation.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{self, Instant};

use crate::condition::{Condition, Observation, RetryDecision, RetryPolicy};
use crate::logging::{LogStage, RepowatchLogger};
use crate::session::{PageSession, ReindexControl, SessionError, WorkflowControl};

/// Pause between observation cycles. Small relative to any realistic deadline
/// and deliberately not configurable.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default query-local wait passed to session observations.
pub const DEFAULT_WAIT_HINT: Duration = Duration::from_secs(1);

/// Parameters of one polling invocation. Constructed immediately before a
/// wait is needed and discarded once an outcome is produced.
#[derive(Debug, Clone)]
pub struct PollRequest {
    /// Condition that resolves the invocation as [`PollOutcome::Succeeded`].
    pub success: Condition,
    /// Non-recoverable error marker; aborts immediately when observed, even
    /// if `success` would also hold.
    pub fatal: Option<Condition>,
    /// Wall-clock budget for the entire invocation, side effects included.
    pub max_wait: Duration,
    /// Query-local wait forwarded to session observations.
    pub wait_hint: Duration,
    /// Trigger a confirmed reindex after each failed observation.
    pub reindex_between_attempts: bool,
    /// Transient workflow failures worth an automatic step retry.
    pub retry_policy: Option<RetryPolicy>,
}

impl PollRequest {
    pub fn new(success: Condition, max_wait: Duration) -> Self {
        Self {
            success,
            fatal: None,
            max_wait,
            wait_hint: DEFAULT_WAIT_HINT,
            reindex_between_attempts: false,
            retry_policy: None,
        }
    }

    /// Shorthand for the most common request: wait for literal text.
    pub fn for_text(text: impl Into<String>, max_wait: Duration) -> Self {
        Self::new(Condition::text(text), max_wait)
    }

    pub fn with_fatal(mut self, fatal: Condition) -> Self {
        self.fatal = Some(fatal);
        self
    }

    pub fn with_reindex(mut self) -> Self {
        self.reindex_between_attempts = true;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn with_wait_hint(mut self, wait_hint: Duration) -> Self {
        self.wait_hint = wait_hint;
        self
    }
}

/// Terminal result of one polling invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The success condition held on a fresh observation.
    Succeeded,
    /// The deadline elapsed with the condition still pending.
    TimedOut,
    /// A recognised non-recoverable failure marker was observed.
    FatalError(String),
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Succeeded)
    }
}

/// Errors raised by [`Poller::poll`] for anything other than an ordinary
/// outcome: malformed requests and collaborator transport failures.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("max wait must be greater than zero")]
    ZeroMaxWait,
    #[error("reindex between attempts requested but no reindex control is configured")]
    MissingReindexControl,
    #[error("retry policy supplied but no workflow control is configured")]
    MissingWorkflowControl,
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Drives the polling protocol over one exclusively-owned page session.
pub struct Poller<S: PageSession> {
    session: S,
    reindex: Option<Arc<dyn ReindexControl>>,
    workflows: Option<Arc<dyn WorkflowControl>>,
    logger: Arc<RepowatchLogger>,
}

impl<S: PageSession> Poller<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            reindex: None,
            workflows: None,
            logger: Arc::new(RepowatchLogger::default()),
        }
    }

    pub fn with_reindex(mut self, control: Arc<dyn ReindexControl>) -> Self {
        self.reindex = Some(control);
        self
    }

    pub fn with_workflows(mut self, control: Arc<dyn WorkflowControl>) -> Self {
        self.workflows = Some(control);
        self
    }

    pub fn with_logger(mut self, logger: Arc<RepowatchLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    fn validate(&self, request: &PollRequest) -> Result<(), PollError> {
        if request.max_wait.is_zero() {
            return Err(PollError::ZeroMaxWait);
        }
        if request.reindex_between_attempts && self.reindex.is_none() {
            return Err(PollError::MissingReindexControl);
        }
        if request.retry_policy.is_some() && self.workflows.is_none() {
            return Err(PollError::MissingWorkflowControl);
        }
        Ok(())
    }

    /// Run the protocol to completion.
    ///
    /// Returns `Ok` with one of the three terminal outcomes; `Err` only for
    /// malformed requests or collaborator transport failures. A reindex that
    /// fails to confirm is [`PollOutcome::FatalError`], not an `Err` — it is a
    /// property of the system under observation, not of the caller's code.
    pub async fn poll(&self, request: PollRequest) -> Result<PollOutcome, PollError> {
        self.validate(&request)?;

        let started = Instant::now();
        let deadline = started + request.max_wait;

        loop {
            // Fresh view each cycle; anything cached from before the last
            // reload is unreachable from here.
            let observation = Observation::new(&self.session, request.wait_hint);

            if let Some(fatal) = &request.fatal {
                if fatal.evaluate(&observation).await? {
                    let detail = fatal.to_string();
                    self.logger.error(
                        LogStage::Poll,
                        format!("fatal marker observed while waiting for {}", request.success),
                    );
                    return Ok(PollOutcome::FatalError(detail));
                }
            }

            if request.success.evaluate(&observation).await? {
                self.logger.debug(
                    LogStage::Poll,
                    format!(
                        "{} observed after {}ms",
                        request.success,
                        started.elapsed().as_millis()
                    ),
                );
                return Ok(PollOutcome::Succeeded);
            }

            if Instant::now() >= deadline {
                self.logger.info(
                    LogStage::Poll,
                    format!(
                        "gave up waiting for {} after {}ms",
                        request.success,
                        started.elapsed().as_millis()
                    ),
                );
                return Ok(PollOutcome::TimedOut);
            }

            if request.reindex_between_attempts {
                // Presence checked by validate().
                if let Some(control) = &self.reindex {
                    if let Err(err) = control.trigger_reindex().await {
                        self.logger
                            .error(LogStage::Reindex, format!("reindex failed: {err}"));
                        return Ok(PollOutcome::FatalError(format!(
                            "reindex did not confirm: {err}"
                        )));
                    }
                    self.logger.debug(LogStage::Reindex, "reindex confirmed");
                }
            }

            if let Some(policy) = &request.retry_policy {
                match policy.check(&observation).await? {
                    RetryDecision::Continue => {}
                    RetryDecision::Succeeded => {
                        self.logger
                            .debug(LogStage::Poll, "retry classifier reported success");
                        return Ok(PollOutcome::Succeeded);
                    }
                    RetryDecision::RetryWorkflow(workflow) => {
                        if let Some(control) = &self.workflows {
                            self.logger.info(
                                LogStage::WorkflowRetry,
                                format!("resetting failed step of {workflow} for retry"),
                            );
                            control.reset_workflow_step(&workflow).await?;
                        }
                    }
                }
            }

            time::sleep(POLL_INTERVAL).await;
            self.session.reload().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::TextPattern;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Session that replays a scripted sequence of page texts, advancing one
    /// frame per reload.
    struct ScriptedSession {
        frames: Vec<String>,
        cursor: Mutex<usize>,
        reloads: Mutex<usize>,
    }

    impl ScriptedSession {
        fn new(frames: &[&str]) -> Self {
            Self {
                frames: frames.iter().map(|frame| frame.to_string()).collect(),
                cursor: Mutex::new(0),
                reloads: Mutex::new(0),
            }
        }

        fn current(&self) -> String {
            let cursor = *self.cursor.lock().unwrap();
            self.frames
                .get(cursor)
                .cloned()
                .unwrap_or_else(|| self.frames.last().cloned().unwrap_or_default())
        }

        fn reload_count(&self) -> usize {
            *self.reloads.lock().unwrap()
        }
    }

    #[async_trait]
    impl PageSession for ScriptedSession {
        async fn has_text(
            &self,
            pattern: &TextPattern,
            _wait_hint: Duration,
        ) -> Result<bool, SessionError> {
            Ok(pattern.is_match(&self.current()))
        }

        async fn has_link(&self, text: &str, _wait_hint: Duration) -> Result<bool, SessionError> {
            Ok(self.current().contains(text))
        }

        async fn has_selector_with_text(
            &self,
            _selector: &str,
            text: &str,
            _wait_hint: Duration,
        ) -> Result<bool, SessionError> {
            Ok(self.current().contains(text))
        }

        async fn reload(&self) -> Result<(), SessionError> {
            *self.reloads.lock().unwrap() += 1;
            let mut cursor = self.cursor.lock().unwrap();
            if *cursor + 1 < self.frames.len() {
                *cursor += 1;
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingReindex {
        calls: Mutex<usize>,
        fail: bool,
    }

    #[async_trait]
    impl ReindexControl for CountingReindex {
        async fn trigger_reindex(&self) -> Result<(), SessionError> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                Err(SessionError::ReindexUnconfirmed {
                    confirmation: "Successfully updated index".to_string(),
                    waited_ms: 5_000,
                })
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct RecordingWorkflows {
        resets: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WorkflowControl for RecordingWorkflows {
        async fn reset_workflow_step(&self, workflow: &str) -> Result<(), SessionError> {
            self.resets.lock().unwrap().push(workflow.to_string());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_observation_performs_no_reload() {
        let poller = Poller::new(ScriptedSession::new(&["v1 Accessioned"]));
        let outcome = poller
            .poll(PollRequest::for_text(
                "v1 Accessioned",
                Duration::from_secs(30),
            ))
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Succeeded);
        assert_eq!(poller.session().reload_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn never_satisfied_condition_times_out() {
        let poller = Poller::new(ScriptedSession::new(&["queued"]));
        let outcome = poller
            .poll(PollRequest::for_text("Accessioned", Duration::from_secs(3)))
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_preempts_simultaneous_success() {
        let session = ScriptedSession::new(&["v1 Accessioned with workflow error"]);
        let poller = Poller::new(session);
        let request = PollRequest::for_text("v1 Accessioned", Duration::from_secs(10))
            .with_fatal(Condition::text("workflow error"));
        let outcome = poller.poll(request).await.unwrap();
        assert!(matches!(outcome, PollOutcome::FatalError(_)));
        assert_eq!(poller.session().reload_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_detail_names_the_marker() {
        let poller = Poller::new(ScriptedSession::new(&["v1 Accessioning Errored"]));
        let request = PollRequest::for_text("v1 Accessioned (complete)", Duration::from_secs(10))
            .with_fatal(Condition::text("Errored"));
        match poller.poll(request).await.unwrap() {
            PollOutcome::FatalError(detail) => assert!(detail.contains("Errored")),
            other => panic!("expected fatal outcome, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_max_wait_is_rejected_before_observing() {
        let poller = Poller::new(ScriptedSession::new(&["anything"]));
        let err = poller
            .poll(PollRequest::for_text("anything", Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::ZeroMaxWait));
    }

    #[tokio::test(start_paused = true)]
    async fn reindex_without_control_is_rejected() {
        let poller = Poller::new(ScriptedSession::new(&["pending"]));
        let err = poller
            .poll(PollRequest::for_text("done", Duration::from_secs(5)).with_reindex())
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::MissingReindexControl));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_policy_without_control_is_rejected() {
        let poller = Poller::new(ScriptedSession::new(&["pending"]));
        let request = PollRequest::for_text("done", Duration::from_secs(5)).with_retry_policy(
            RetryPolicy::transient_text("accessionWF", TextPattern::literal("timeout")),
        );
        let err = poller.poll(request).await.unwrap_err();
        assert!(matches!(err, PollError::MissingWorkflowControl));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reindex_aborts_as_fatal() {
        let reindex = Arc::new(CountingReindex {
            fail: true,
            ..Default::default()
        });
        let poller =
            Poller::new(ScriptedSession::new(&["pending"])).with_reindex(reindex.clone());
        let outcome = poller
            .poll(PollRequest::for_text("done", Duration::from_secs(30)).with_reindex())
            .await
            .unwrap();
        match outcome {
            PollOutcome::FatalError(detail) => {
                assert!(detail.contains("reindex did not confirm"));
            }
            other => panic!("expected fatal outcome, got {other:?}"),
        }
        assert_eq!(*reindex.calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reindex_runs_every_unsatisfied_cycle() {
        let reindex = Arc::new(CountingReindex::default());
        let session = ScriptedSession::new(&["pending", "pending", "done"]);
        let poller = Poller::new(session).with_reindex(reindex.clone());
        let outcome = poller
            .poll(PollRequest::for_text("done", Duration::from_secs(30)).with_reindex())
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Succeeded);
        // Two unsatisfied observations, one reindex after each.
        assert_eq!(*reindex.calls.lock().unwrap(), 2);
        assert_eq!(poller.session().reload_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_error_resets_step_then_succeeds() {
        let workflows = Arc::new(RecordingWorkflows::default());
        let session = ScriptedSession::new(&[
            "accessionWF error: Net::ReadTimeout",
            "accessionWF error: Net::ReadTimeout",
            "v1 Accessioned",
        ]);
        let poller = Poller::new(session).with_workflows(workflows.clone());
        let request = PollRequest::for_text("v1 Accessioned", Duration::from_secs(60))
            .with_retry_policy(RetryPolicy::transient_text(
                "accessionWF",
                TextPattern::literal("Net::ReadTimeout"),
            ));
        let outcome = poller.poll(request).await.unwrap();
        assert_eq!(outcome, PollOutcome::Succeeded);
        assert_eq!(
            *workflows.resets.lock().unwrap(),
            vec!["accessionWF".to_string(), "accessionWF".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dynamic_retry_can_target_different_workflows() {
        let workflows = Arc::new(RecordingWorkflows::default());
        let session = ScriptedSession::new(&[
            "Error in accessionWF",
            "Error in etdSubmitWF",
            "v1 Accessioned",
        ]);
        let poller = Poller::new(session).with_workflows(workflows.clone());
        let request = PollRequest::for_text("v1 Accessioned", Duration::from_secs(60))
            .with_retry_policy(RetryPolicy::dynamic(|obs: &Observation| {
                Box::pin(async move {
                    for workflow in ["accessionWF", "etdSubmitWF"] {
                        let marker = TextPattern::literal(&format!("Error in {workflow}"));
                        if obs.has_text(&marker).await? {
                            return Ok(RetryDecision::RetryWorkflow(workflow.to_string()));
                        }
                    }
                    Ok(RetryDecision::Continue)
                })
            }));
        let outcome = poller.poll(request).await.unwrap();
        assert_eq!(outcome, PollOutcome::Succeeded);
        assert_eq!(
            *workflows.resets.lock().unwrap(),
            vec!["accessionWF".to_string(), "etdSubmitWF".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_classifier_may_establish_success() {
        let workflows = Arc::new(RecordingWorkflows::default());
        let poller = Poller::new(ScriptedSession::new(&["object published"]))
            .with_workflows(workflows.clone());
        // Success condition never matches; the classifier resolves instead.
        let request = PollRequest::for_text("never appears", Duration::from_secs(30))
            .with_retry_policy(RetryPolicy::dynamic(|obs: &Observation| {
                Box::pin(async move {
                    if obs.has_text(&TextPattern::literal("published")).await? {
                        Ok(RetryDecision::Succeeded)
                    } else {
                        Ok(RetryDecision::Continue)
                    }
                })
            }));
        let outcome = poller.poll(request).await.unwrap();
        assert_eq!(outcome, PollOutcome::Succeeded);
        assert!(workflows.resets.lock().unwrap().is_empty());
    }
}
