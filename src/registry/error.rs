use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to fetch access token: {0}")]
    TokenFetch(String),

    #[error("Registry login command failed: {0}")]
    LoginCommand(String),

    #[error("Could not resolve host environment: {0}")]
    Environment(String),

    #[error("Failed to read credential store {}: {reason}", .path.display())]
    Read { path: PathBuf, reason: String },

    #[error("Failed to write credential store {}: {reason}", .path.display())]
    Write { path: PathBuf, reason: String },
}

impl SessionError {
    /// Fixed message reported to the caller's log sink for this error kind.
    ///
    /// The detailed cause goes to tracing; the sink only ever sees one of these.
    pub fn sink_message(&self, credential_file_name: &str) -> String {
        match self {
            SessionError::TokenFetch(_) => {
                "Could not fetch access token from metadata server.".to_string()
            }
            SessionError::LoginCommand(_) => "Registry login failed.".to_string(),
            SessionError::Environment(_) => "Could not retrieve agent environment.".to_string(),
            SessionError::Read { .. } => {
                format!("Could not read and parse {}.", credential_file_name)
            }
            SessionError::Write { .. } => format!("Could not write {}", credential_file_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_messages_use_configured_file_name() {
        let read = SessionError::Read {
            path: PathBuf::from("/home/ci/.dockercfg"),
            reason: "No such file or directory".to_string(),
        };
        assert_eq!(
            read.sink_message(".dockercfg"),
            "Could not read and parse .dockercfg."
        );

        let write = SessionError::Write {
            path: PathBuf::from("/home/ci/config.json"),
            reason: "Permission denied".to_string(),
        };
        assert_eq!(write.sink_message("config.json"), "Could not write config.json");
    }

    #[test]
    fn test_display_includes_path_and_reason() {
        let err = SessionError::Read {
            path: PathBuf::from("/tmp/.dockercfg"),
            reason: "expected a JSON object".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to read credential store /tmp/.dockercfg: expected a JSON object"
        );
    }
}
