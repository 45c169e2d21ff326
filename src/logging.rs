//! Poll progress logging.
//!
//! The protocol narrates itself in a handful of fixed stages (the cycle
//! itself, reindex side effects, workflow retries, raw session traffic), so
//! records carry a typed [`LogStage`] rather than free-form categories.
//! Scenario harnesses that aggregate their own output install a sink; without
//! one, records render to stderr so they interleave with test harness output
//! rather than captured stdout.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Verbosity;

/// Where in the protocol a record originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogStage {
    /// The observe/decide cycle itself.
    Poll,
    /// Reindex side effects between attempts.
    Reindex,
    /// Automatic retry of failed workflow steps.
    WorkflowRetry,
    /// Raw page-session traffic, adapter-level.
    Session,
}

impl LogStage {
    pub fn as_str(self) -> &'static str {
        match self {
            LogStage::Poll => "poll",
            LogStage::Reindex => "reindex",
            LogStage::WorkflowRetry => "workflow-retry",
            LogStage::Session => "session",
        }
    }
}

/// Severity, gated against [`Verbosity`]: errors always pass, info needs at
/// least `Medium`, debug needs `Detailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Info,
    Debug,
}

impl LogLevel {
    fn threshold(self) -> u8 {
        match self {
            LogLevel::Error => 0,
            LogLevel::Info => 1,
            LogLevel::Debug => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// One emitted record, serializable for sinks that ship output elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollLogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub stage: LogStage,
    pub message: String,
}

impl PollLogRecord {
    fn new(level: LogLevel, stage: LogStage, message: String) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            stage,
            message,
        }
    }

    /// Single-line console form.
    pub fn render(&self) -> String {
        format!(
            "{} {:<5} {}: {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.level.label(),
            self.stage.as_str(),
            self.message
        )
    }
}

/// Callback receiving every record that passes the verbosity gate.
pub type LogSink = Arc<dyn Fn(&PollLogRecord) + Send + Sync + 'static>;

/// Logger shared by the poller and its adapters.
pub struct RepowatchLogger {
    verbose: Verbosity,
    sink: Option<LogSink>,
}

impl Default for RepowatchLogger {
    fn default() -> Self {
        Self::new(Verbosity::default())
    }
}

impl fmt::Debug for RepowatchLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepowatchLogger")
            .field("verbosity", &self.verbose)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl RepowatchLogger {
    pub fn new(verbose: Verbosity) -> Self {
        Self {
            verbose,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: LogSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbose
    }

    fn emit(&self, level: LogLevel, stage: LogStage, message: String) {
        if level.threshold() > self.verbose.as_u8() {
            return;
        }
        let record = PollLogRecord::new(level, stage, message);
        match &self.sink {
            Some(sink) => sink(&record),
            None => eprintln!("{}", record.render()),
        }
    }

    pub fn error(&self, stage: LogStage, message: impl Into<String>) {
        self.emit(LogLevel::Error, stage, message.into());
    }

    pub fn info(&self, stage: LogStage, message: impl Into<String>) {
        self.emit(LogLevel::Info, stage, message.into());
    }

    pub fn debug(&self, stage: LogStage, message: impl Into<String>) {
        self.emit(LogLevel::Debug, stage, message.into());
    }
}
