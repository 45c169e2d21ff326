//! Repowatch: asynchronous-completion polling for browser-driven
//! repository integration suites.
//!
//! Background work in a digital repository (indexing, workflow steps,
//! accessioning jobs) finishes on its own schedule. The [`Poller`] blocks a
//! scenario until that work is observably complete: it re-observes an
//! externally displayed page through a [`session::PageSession`], reloading
//! between attempts, until a success condition holds, a fatal marker appears,
//! or the deadline elapses. Known-transient workflow failures can be retried
//! automatically via a [`condition::RetryPolicy`], and an optional reindex
//! side effect keeps the observed index fresh between attempts.
//!
//! The crate owns only the protocol and its typed seams; browsers, target
//! applications, and scenario orchestration belong to the caller. A
//! `chromiumoxide`-backed adapter is provided for real-browser use.

pub mod adapter;
pub mod condition;
pub mod config;
pub mod credentials;
pub mod logging;
pub mod poller;
pub mod session;

pub use condition::{Condition, Observation, RetryDecision, RetryPolicy, TextPattern};
pub use config::{ConfigError, RepowatchConfig, Verbosity};
pub use credentials::{CredentialProvider, Credentials, CredentialsError, EnvCredentialProvider};
pub use logging::{LogLevel, LogSink, LogStage, PollLogRecord, RepowatchLogger};
pub use poller::{PollError, PollOutcome, PollRequest, Poller, DEFAULT_WAIT_HINT, POLL_INTERVAL};
pub use session::{PageSession, ReindexControl, SessionError, WorkflowControl};
