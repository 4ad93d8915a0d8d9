//! Registry session manager for build hosts.
//!
//! [`SessionManager::login`] authenticates the host against a container
//! registry (gcr.io by default) with an access token from the instance
//! metadata server; [`SessionManager::logout`] removes the registry's entry
//! from the host's JSON credential store again.
//!
//! The embedding build system owns the calling convention: call `login`
//! before the protected step and, only when it succeeded, `logout` after it.
//! [`SessionManager::run_wrapped`] implements exactly that.

pub mod config;
pub mod registry;

pub use config::SessionConfig;
pub use registry::{
    HostEnvironment, LocalEnvironment, LogSink, SessionError, SessionManager, SessionState,
    WrappedOutcome,
};
