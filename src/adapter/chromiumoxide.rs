//! Chromiumoxide-backed implementations of the collaborator seams.
//!
//! [`ChromiumoxideSession`] wraps a live CDP page and answers observation
//! queries by evaluating small JavaScript expressions against the rendered
//! document. Queries re-check briefly (bounded by the caller's `wait_hint`)
//! so a page that is still painting gets a fair chance to answer before the
//! poller counts the observation as a miss.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::page::Page;
use serde_json::Value as JsonValue;
use tokio::time::{self, Instant};

use crate::condition::TextPattern;
use crate::logging::{LogStage, RepowatchLogger};
use crate::session::{PageSession, ReindexControl, SessionError, WorkflowControl};

/// Pause between in-query re-checks while a `wait_hint` is still open.
const QUERY_TICK: Duration = Duration::from_millis(100);

fn map_cdp(err: impl std::fmt::Display) -> SessionError {
    SessionError::Message(err.to_string())
}

/// Quote a string as a JavaScript string literal.
fn js_string(value: &str) -> String {
    // serde_json string encoding is valid JS source for string literals.
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Page-level controls that vary between target applications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Visible text of the control that triggers a reindex.
    pub reindex_control_text: String,
    /// Literal acknowledgement shown once the index update is queued.
    pub reindex_confirmation: String,
    /// How long to wait for the reindex acknowledgement before failing.
    pub reindex_confirm_wait: Duration,
    /// Visible text of the control that marks a failed step for retry.
    pub retry_control_text: String,
    /// How long to wait for the retry control to render once the workflow
    /// view is open.
    pub retry_control_wait: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            reindex_control_text: "Reindex".to_string(),
            reindex_confirmation: "Successfully updated index".to_string(),
            reindex_confirm_wait: Duration::from_secs(5),
            retry_control_text: "Retry".to_string(),
            retry_control_wait: Duration::from_secs(5),
        }
    }
}

/// Live-browser session observed and mutated by the poller.
pub struct ChromiumoxideSession {
    page: Page,
    settings: SessionSettings,
    logger: Arc<RepowatchLogger>,
}

impl ChromiumoxideSession {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            settings: SessionSettings::default(),
            logger: Arc::new(RepowatchLogger::default()),
        }
    }

    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_logger(mut self, logger: Arc<RepowatchLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    async fn eval_bool(&self, expression: &str) -> Result<bool, SessionError> {
        let result = self.page.evaluate(expression).await.map_err(map_cdp)?;
        Ok(result
            .value()
            .and_then(JsonValue::as_bool)
            .unwrap_or(false))
    }

    async fn visible_text(&self) -> Result<String, SessionError> {
        let result = self
            .page
            .evaluate("document.body ? document.body.innerText : ''")
            .await
            .map_err(map_cdp)?;
        Ok(result
            .value()
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn text_matches(&self, pattern: &TextPattern) -> Result<bool, SessionError> {
        Ok(pattern.is_match(&self.visible_text().await?))
    }

    /// Re-run `check` until it answers true or `wait_hint` elapses.
    async fn settle<F, Fut>(&self, wait_hint: Duration, check: F) -> Result<bool, SessionError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<bool, SessionError>>,
    {
        let deadline = Instant::now() + wait_hint;
        loop {
            if check().await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            time::sleep(QUERY_TICK).await;
        }
    }

    /// Click the first anchor/button whose trimmed text equals `text`.
    /// Resolves to whether such a control existed.
    async fn click_control(&self, text: &str) -> Result<bool, SessionError> {
        self.eval_bool(&click_control_expression(text)).await
    }
}

fn link_query_expression(text: &str) -> String {
    format!(
        "Array.from(document.querySelectorAll('a')).some(el => el.textContent.includes({}))",
        js_string(text)
    )
}

fn selector_query_expression(selector: &str, text: &str) -> String {
    format!(
        "Array.from(document.querySelectorAll({})).some(el => el.textContent.includes({}))",
        js_string(selector),
        js_string(text)
    )
}

fn click_control_expression(text: &str) -> String {
    format!(
        "(() => {{ const el = Array.from(document.querySelectorAll('a, button, input[type=submit]'))\
         .find(el => (el.textContent || el.value || '').trim() === {}); \
         if (!el) return false; el.click(); return true; }})()",
        js_string(text)
    )
}

#[async_trait]
impl PageSession for ChromiumoxideSession {
    async fn has_text(
        &self,
        pattern: &TextPattern,
        wait_hint: Duration,
    ) -> Result<bool, SessionError> {
        self.settle(wait_hint, || self.text_matches(pattern)).await
    }

    async fn has_link(&self, text: &str, wait_hint: Duration) -> Result<bool, SessionError> {
        let expression = link_query_expression(text);
        self.settle(wait_hint, || self.eval_bool(&expression)).await
    }

    async fn has_selector_with_text(
        &self,
        selector: &str,
        text: &str,
        wait_hint: Duration,
    ) -> Result<bool, SessionError> {
        let expression = selector_query_expression(selector, text);
        self.settle(wait_hint, || self.eval_bool(&expression)).await
    }

    async fn reload(&self) -> Result<(), SessionError> {
        self.page.reload().await.map_err(map_cdp)?;
        Ok(())
    }
}

#[async_trait]
impl ReindexControl for ChromiumoxideSession {
    async fn trigger_reindex(&self) -> Result<(), SessionError> {
        if !self.click_control(&self.settings.reindex_control_text).await? {
            return Err(SessionError::Message(format!(
                "no '{}' control on the current page",
                self.settings.reindex_control_text
            )));
        }

        let confirmation = TextPattern::literal(&self.settings.reindex_confirmation);
        let confirmed = self
            .settle(self.settings.reindex_confirm_wait, || {
                self.text_matches(&confirmation)
            })
            .await?;
        if confirmed {
            self.logger.debug(
                LogStage::Reindex,
                format!("reindex acknowledged: {}", self.settings.reindex_confirmation),
            );
            Ok(())
        } else {
            Err(SessionError::ReindexUnconfirmed {
                confirmation: self.settings.reindex_confirmation.clone(),
                waited_ms: self.settings.reindex_confirm_wait.as_millis() as u64,
            })
        }
    }
}

#[async_trait]
impl WorkflowControl for ChromiumoxideSession {
    async fn reset_workflow_step(&self, workflow: &str) -> Result<(), SessionError> {
        // Open the named workflow's detail view from the workflow grid.
        if !self.click_control(workflow).await? {
            return Err(SessionError::Message(format!(
                "workflow '{workflow}' is not linked from the current page"
            )));
        }

        // The retry control renders once the failed step's row is expanded.
        let retry_text = self.settings.retry_control_text.clone();
        let appeared = self
            .settle(self.settings.retry_control_wait, || {
                self.click_control(&retry_text)
            })
            .await?;
        if appeared {
            self.logger.info(
                LogStage::WorkflowRetry,
                format!("marked failed step of {workflow} for retry"),
            );
            Ok(())
        } else {
            Err(SessionError::NoRetryableStep {
                workflow: workflow.to_string(),
            })
        }
    }
}
