// Login/logout orchestration for one build session

use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::credentials;
use super::{HostEnvironment, LogSink, MetadataTokenSource, RegistryLoginExecutor, SessionError};
use crate::config::SessionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    LoggedIn,
}

/// Result of [`SessionManager::run_wrapped`]
#[derive(Debug, PartialEq, Eq)]
pub enum WrappedOutcome<T> {
    /// Login failed; the step was not run and no logout was attempted.
    LoginFailed,
    /// The step ran. `logged_out` reports whether the logout afterwards succeeded.
    Completed { result: T, logged_out: bool },
}

/// Pairs a registry login with the matching credential store cleanup.
///
/// Errors never escape `login`/`logout`: each one is logged to the sink with a
/// fixed message and turned into `false`. Callers must only run the protected
/// step, and only call `logout`, after `login` returned `true`.
pub struct SessionManager {
    config: SessionConfig,
    token_source: MetadataTokenSource,
    executor: RegistryLoginExecutor,
    env: Arc<dyn HostEnvironment>,
    sink: Arc<dyn LogSink>,
    state: SessionState,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        env: Arc<dyn HostEnvironment>,
        sink: Arc<dyn LogSink>,
    ) -> Result<Self, SessionError> {
        let token_source = MetadataTokenSource::new(&config.metadata_endpoint, config.timeout)?;
        let executor = RegistryLoginExecutor::new(
            &config.container_cli,
            &config.registry_url,
            &config.username,
        );

        Ok(Self {
            config,
            token_source,
            executor,
            env,
            sink,
            state: SessionState::Idle,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Fetch a token and log in to the registry.
    pub async fn login(&mut self) -> bool {
        if self.state == SessionState::LoggedIn {
            warn!(
                "Login requested for {} while already logged in",
                self.config.registry_url
            );
        }

        match self.try_login().await {
            Ok(()) => {
                info!("Logged in to {}", self.config.registry_url);
                self.state = SessionState::LoggedIn;
                true
            }
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    /// Remove the registry's entry from the credential store.
    ///
    /// Allowed while idle; the edit is then a no-op when no entry exists.
    pub async fn logout(&mut self) -> bool {
        if self.state == SessionState::Idle {
            warn!(
                "Logout requested for {} without a prior login",
                self.config.registry_url
            );
        }

        let result = self.try_logout().await;
        self.state = SessionState::Idle;

        match result {
            Ok(removed) => {
                if removed {
                    info!("Logged out of {}", self.config.registry_url);
                } else {
                    info!(
                        "No credentials for {} in {}, nothing to remove",
                        self.config.registry_url,
                        self.config.display_file_name()
                    );
                }
                true
            }
            Err(e) => {
                self.report(&e);
                false
            }
        }
    }

    /// Run `step` inside a login/logout pair.
    ///
    /// The step is skipped when login fails. Once login succeeded, logout
    /// always runs, whatever the step returned.
    pub async fn run_wrapped<F, Fut, T>(&mut self, step: F) -> WrappedOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if !self.login().await {
            return WrappedOutcome::LoginFailed;
        }

        let result = step().await;
        let logged_out = self.logout().await;

        WrappedOutcome::Completed { result, logged_out }
    }

    async fn try_login(&self) -> Result<(), SessionError> {
        let token = self.token_source.fetch_access_token().await?;

        let code = self.executor.login(&token, self.sink.as_ref()).await?;
        if code != 0 {
            return Err(SessionError::LoginCommand(format!(
                "{} login exited with code {}",
                self.config.container_cli, code
            )));
        }

        Ok(())
    }

    async fn try_logout(&self) -> Result<bool, SessionError> {
        let path = credentials::resolve_path(&self.config, self.env.as_ref()).await?;

        let mut store = credentials::read(&path)?;
        let removed = credentials::remove_entry(&mut store, &self.config.registry_url);
        credentials::write(&path, &store)?;

        Ok(removed)
    }

    fn report(&self, err: &SessionError) {
        error!(error = %err, registry = %self.config.registry_url, "Registry session operation failed");
        self.sink
            .fatal(&err.sink_message(&self.config.display_file_name()));
    }
}
