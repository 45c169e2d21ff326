//! Collaborator interfaces consumed by the poller.
//!
//! The poller never inspects raw markup. Everything it learns about the
//! outside world arrives through these seams: boolean page queries, a reload
//! action, and the two optional side-effect controls (reindex and workflow
//! retry). Implementations live behind `async_trait` objects so scenarios can
//! swap a real browser session for a scripted one in tests.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::condition::TextPattern;

/// Error surfaced by a collaborator while observing or mutating the page.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("browser session error: {0}")]
    Message(String),
    #[error("reindex confirmation '{confirmation}' did not appear within {waited_ms}ms")]
    ReindexUnconfirmed { confirmation: String, waited_ms: u64 },
    #[error("workflow '{workflow}' has no step available for retry")]
    NoRetryableStep { workflow: String },
}

/// Point-in-time queries against the currently displayed external page.
///
/// `wait_hint` is a short, query-local wait — implementations may re-check
/// for up to that long before answering `false`. It is unrelated to the
/// overall deadline of a poll, which the poller tracks itself.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// True when the page's visible text matches `pattern`.
    async fn has_text(
        &self,
        pattern: &TextPattern,
        wait_hint: Duration,
    ) -> Result<bool, SessionError>;

    /// True when a link whose text contains `text` is present.
    async fn has_link(&self, text: &str, wait_hint: Duration) -> Result<bool, SessionError>;

    /// True when an element matching `selector` currently shows `text`.
    async fn has_selector_with_text(
        &self,
        selector: &str,
        text: &str,
        wait_hint: Duration,
    ) -> Result<bool, SessionError>;

    /// Re-fetch the observed page, invalidating any cached DOM state.
    async fn reload(&self) -> Result<(), SessionError>;
}

/// Side effect that refreshes the search/catalog index behind the page.
///
/// Implementations must block until the index update is acknowledged (a short
/// literal confirmation on the page) and return
/// [`SessionError::ReindexUnconfirmed`] when it is not.
#[async_trait]
pub trait ReindexControl: Send + Sync {
    async fn trigger_reindex(&self) -> Result<(), SessionError>;
}

/// Control that marks the most recent failed step of a named workflow for
/// re-execution.
#[async_trait]
pub trait WorkflowControl: Send + Sync {
    async fn reset_workflow_step(&self, workflow: &str) -> Result<(), SessionError>;
}
