//! Predicates evaluated against page observations.
//!
//! A [`Condition`] is a pure function of the latest [`Observation`]: it may be
//! a literal/regex text containment check, a link or selector check, a
//! combinator over other conditions, or a caller-supplied async closure for
//! compound checks the built-in variants cannot express. Retry classification
//! uses the same observation but answers with a [`RetryDecision`] instead of a
//! plain boolean, so the retry target can change between attempts.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use regex::Regex;

use crate::session::{PageSession, SessionError};

/// Text matcher accepted by observation queries: a literal substring or a
/// regular expression.
#[derive(Debug, Clone)]
pub enum TextPattern {
    Literal(String),
    Regex(Regex),
}

impl TextPattern {
    pub fn literal(text: impl Into<String>) -> Self {
        TextPattern::Literal(text.into())
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(TextPattern::Regex(Regex::new(pattern)?))
    }

    /// True when `haystack` contains the literal text or matches the regex.
    pub fn is_match(&self, haystack: &str) -> bool {
        match self {
            TextPattern::Literal(text) => haystack.contains(text.as_str()),
            TextPattern::Regex(regex) => regex.is_match(haystack),
        }
    }
}

impl fmt::Display for TextPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextPattern::Literal(text) => write!(f, "text '{text}'"),
            TextPattern::Regex(regex) => write!(f, "text matching /{}/", regex.as_str()),
        }
    }
}

/// Point-in-time view over the live session.
///
/// The poller constructs a fresh `Observation` each cycle, after the most
/// recent reload, so predicates can never decide success from stale state.
pub struct Observation<'a> {
    session: &'a dyn PageSession,
    wait_hint: Duration,
}

impl<'a> Observation<'a> {
    pub(crate) fn new(session: &'a dyn PageSession, wait_hint: Duration) -> Self {
        Self { session, wait_hint }
    }

    pub async fn has_text(&self, pattern: &TextPattern) -> Result<bool, SessionError> {
        self.session.has_text(pattern, self.wait_hint).await
    }

    pub async fn has_link(&self, text: &str) -> Result<bool, SessionError> {
        self.session.has_link(text, self.wait_hint).await
    }

    pub async fn has_selector_with_text(
        &self,
        selector: &str,
        text: &str,
    ) -> Result<bool, SessionError> {
        self.session
            .has_selector_with_text(selector, text, self.wait_hint)
            .await
    }
}

/// Caller-supplied compound check over an observation.
pub type CustomCheck = Arc<
    dyn for<'a> Fn(&'a Observation<'a>) -> BoxFuture<'a, Result<bool, SessionError>> + Send + Sync,
>;

/// Predicate over the current observation, used both for success and for
/// fatal-error detection.
#[derive(Clone)]
pub enum Condition {
    /// Visible page text matches the pattern.
    Text(TextPattern),
    /// A link with the given text is present.
    Link(String),
    /// An element matching the selector shows the given text.
    SelectorWithText { selector: String, text: String },
    /// Every inner condition holds.
    All(Vec<Condition>),
    /// At least one inner condition holds.
    Any(Vec<Condition>),
    /// Arbitrary compound check.
    Custom { label: String, check: CustomCheck },
}

impl Condition {
    pub fn text(text: impl Into<String>) -> Self {
        Condition::Text(TextPattern::literal(text))
    }

    pub fn matching(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Condition::Text(TextPattern::regex(pattern)?))
    }

    pub fn link(text: impl Into<String>) -> Self {
        Condition::Link(text.into())
    }

    pub fn selector_with_text(selector: impl Into<String>, text: impl Into<String>) -> Self {
        Condition::SelectorWithText {
            selector: selector.into(),
            text: text.into(),
        }
    }

    /// Wrap an async closure as a condition. The label stands in for the
    /// closure in failure messages.
    pub fn custom<F>(label: impl Into<String>, check: F) -> Self
    where
        F: for<'a> Fn(&'a Observation<'a>) -> BoxFuture<'a, Result<bool, SessionError>>
            + Send
            + Sync
            + 'static,
    {
        Condition::Custom {
            label: label.into(),
            check: Arc::new(check),
        }
    }

    /// Evaluate this condition against `observation`.
    ///
    /// Boxed so `All`/`Any` can recurse without an infinitely-sized future.
    pub fn evaluate<'a>(
        &'a self,
        observation: &'a Observation<'a>,
    ) -> BoxFuture<'a, Result<bool, SessionError>> {
        Box::pin(async move {
            match self {
                Condition::Text(pattern) => observation.has_text(pattern).await,
                Condition::Link(text) => observation.has_link(text).await,
                Condition::SelectorWithText { selector, text } => {
                    observation.has_selector_with_text(selector, text).await
                }
                Condition::All(inner) => {
                    for condition in inner {
                        if !condition.evaluate(observation).await? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                Condition::Any(inner) => {
                    for condition in inner {
                        if condition.evaluate(observation).await? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                Condition::Custom { check, .. } => check(observation).await,
            }
        })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Text(pattern) => write!(f, "{pattern}"),
            Condition::Link(text) => write!(f, "link '{text}'"),
            Condition::SelectorWithText { selector, text } => {
                write!(f, "selector '{selector}' showing '{text}'")
            }
            Condition::All(inner) => {
                write!(f, "all of [")?;
                for (i, condition) in inner.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{condition}")?;
                }
                write!(f, "]")
            }
            Condition::Any(inner) => {
                write!(f, "any of [")?;
                for (i, condition) in inner.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{condition}")?;
                }
                write!(f, "]")
            }
            Condition::Custom { label, .. } => write!(f, "{label}"),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Condition({self})")
    }
}

/// Per-cycle answer from the retry classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Nothing recognised; keep polling.
    Continue,
    /// The classifier itself established success.
    Succeeded,
    /// The named workflow shows a transient failure; reset its failed step
    /// and keep polling under the same deadline.
    RetryWorkflow(String),
}

/// Dynamic retry classifier, for callers whose retry target can change
/// between attempts.
pub type RetryCheck = Arc<
    dyn for<'a> Fn(&'a Observation<'a>) -> BoxFuture<'a, Result<RetryDecision, SessionError>>
        + Send
        + Sync,
>;

/// Recognises known-transient workflow failures worth an automatic retry.
#[derive(Clone)]
pub enum RetryPolicy {
    /// Fixed workflow name and transient-error text pattern.
    TransientText {
        workflow: String,
        pattern: TextPattern,
    },
    /// Caller-supplied classifier evaluated once per cycle.
    Dynamic(RetryCheck),
}

impl RetryPolicy {
    pub fn transient_text(workflow: impl Into<String>, pattern: TextPattern) -> Self {
        RetryPolicy::TransientText {
            workflow: workflow.into(),
            pattern,
        }
    }

    pub fn dynamic<F>(check: F) -> Self
    where
        F: for<'a> Fn(&'a Observation<'a>) -> BoxFuture<'a, Result<RetryDecision, SessionError>>
            + Send
            + Sync
            + 'static,
    {
        RetryPolicy::Dynamic(Arc::new(check))
    }

    pub(crate) async fn check(
        &self,
        observation: &Observation<'_>,
    ) -> Result<RetryDecision, SessionError> {
        match self {
            RetryPolicy::TransientText { workflow, pattern } => {
                if observation.has_text(pattern).await? {
                    Ok(RetryDecision::RetryWorkflow(workflow.clone()))
                } else {
                    Ok(RetryDecision::Continue)
                }
            }
            RetryPolicy::Dynamic(check) => check(observation).await,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryPolicy::TransientText { workflow, pattern } => f
                .debug_struct("TransientText")
                .field("workflow", workflow)
                .field("pattern", &pattern.to_string())
                .finish(),
            RetryPolicy::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}
