// Registry session module - gcr.io login/logout for a build host
//
// A session fetches a short-lived token from the instance metadata server,
// hands it to the container CLI's `login`, and afterwards removes the
// registry entry from the host's JSON credential store.

pub mod credentials;
mod environment;
mod error;
mod sink;
mod login;
mod metadata;
mod session;

pub use credentials::CredentialMap;
pub use environment::{HostEnvironment, LocalEnvironment, StaticEnvironment};
pub use error::SessionError;
pub use sink::{LogSink, StdoutSink};
#[cfg(test)]
pub(crate) use sink::MemorySink;
pub use login::RegistryLoginExecutor;
pub use metadata::{AccessToken, MetadataTokenSource, METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE};
pub use session::{SessionManager, SessionState, WrappedOutcome};
