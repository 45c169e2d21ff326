//! Explicit credential handling for authenticated target applications.
//!
//! Credentials are obtained once from an injected provider and threaded
//! through calls by the surrounding harness. There is deliberately no
//! process-wide cached login state here: a scenario that needs to sign in
//! asks its provider and owns the resulting value.

use std::env;

use dotenvy::dotenv;
use thiserror::Error;

const ENV_USERNAME: &str = "REPOWATCH_USERNAME";
const ENV_PASSWORD: &str = "REPOWATCH_PASSWORD";

/// Error surfaced while resolving credentials.
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("credential variable {0} is not set")]
    Missing(&'static str),
}

/// A username/password pair for one target application.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

// Keep the password out of debug output and log records.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of credentials, injected by the harness.
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self) -> Result<Credentials, CredentialsError>;
}

/// Provider backed by environment variables, honouring a `.env` file.
#[derive(Debug, Default)]
pub struct EnvCredentialProvider;

impl CredentialProvider for EnvCredentialProvider {
    fn credentials(&self) -> Result<Credentials, CredentialsError> {
        dotenv().ok();
        let username =
            env::var(ENV_USERNAME).map_err(|_| CredentialsError::Missing(ENV_USERNAME))?;
        let password =
            env::var(ENV_PASSWORD).map_err(|_| CredentialsError::Missing(ENV_PASSWORD))?;
        Ok(Credentials::new(username, password))
    }
}
