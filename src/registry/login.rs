// Registry login via the container CLI

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{AccessToken, LogSink, SessionError};

/// Runs `<container_cli> login` non-interactively for a single registry.
#[derive(Debug, Clone)]
pub struct RegistryLoginExecutor {
    container_cli: String,
    registry_url: String,
    username: String,
}

impl RegistryLoginExecutor {
    pub fn new(
        container_cli: impl Into<String>,
        registry_url: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            container_cli: container_cli.into(),
            registry_url: registry_url.into(),
            username: username.into(),
        }
    }

    /// Log in with `token` and return the command's exit code.
    ///
    /// The token goes over stdin, never argv. Output is forwarded to `sink`
    /// line by line while the command runs. A process killed by a signal
    /// reports `-1`.
    pub async fn login(&self, token: &AccessToken, sink: &dyn LogSink) -> Result<i32, SessionError> {
        debug!(
            "Executing: {} login --username {} --password-stdin {}",
            self.container_cli, self.username, self.registry_url
        );

        let mut child = Command::new(&self.container_cli)
            .arg("login")
            .arg("--username")
            .arg(&self.username)
            .arg("--password-stdin")
            .arg(&self.registry_url)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SessionError::LoginCommand(format!(
                    "Failed to execute {} login: {}",
                    self.container_cli, e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(token.as_str().as_bytes()).await {
                Ok(()) => {}
                // The command may exit before reading its password
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("{} login closed stdin early", self.container_cli);
                }
                Err(e) => {
                    return Err(SessionError::LoginCommand(format!(
                        "Failed to pass token to {} login: {}",
                        self.container_cli, e
                    )));
                }
            }
        }

        let (stdout_result, stderr_result) = tokio::join!(
            forward_lines(child.stdout.take(), sink, ""),
            forward_lines(child.stderr.take(), sink, "[stderr] "),
        );
        for result in [stdout_result, stderr_result] {
            if let Err(e) = result {
                warn!("Stopped forwarding {} login output: {}", self.container_cli, e);
            }
        }

        let status = child.wait().await.map_err(|e| {
            SessionError::LoginCommand(format!(
                "Failed to wait for {} login: {}",
                self.container_cli, e
            ))
        })?;

        debug!("{} login exited with status: {}", self.container_cli, status);
        Ok(status.code().unwrap_or(-1))
    }
}

/// Forward raw output lines until EOF.
///
/// Output is not required to be UTF-8; invalid bytes are replaced rather than
/// ending the stream, so the pipe is always drained.
async fn forward_lines<R>(reader: Option<R>, sink: &dyn LogSink, prefix: &str) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(());
    };

    let mut lines = BufReader::new(reader).split(b'\n');
    while let Some(raw) = lines.next_segment().await? {
        let line = String::from_utf8_lossy(&raw);
        sink.line(&format!("{}{}", prefix, line.trim_end_matches('\r')));
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::registry::test_support::write_fake_cli;
    use crate::registry::MemorySink;

    #[tokio::test]
    async fn test_login_passes_arguments_and_token_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("invocation");
        let cli = write_fake_cli(
            dir.path(),
            &format!(
                "printf '%s\\n' \"$@\" > '{record}'\ntoken=$(cat)\nprintf 'stdin=%s\\n' \"$token\" >> '{record}'\necho 'Login Succeeded'\n",
                record = record.display()
            ),
        );

        let executor = RegistryLoginExecutor::new(cli.to_string_lossy(), "https://gcr.io", "_token");
        let sink = MemorySink::new();

        let code = executor
            .login(&AccessToken::new("abc123"), &sink)
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(sink.lines(), vec!["Login Succeeded".to_string()]);

        let recorded = std::fs::read_to_string(&record).unwrap();
        assert_eq!(
            recorded,
            "login\n--username\n_token\n--password-stdin\nhttps://gcr.io\nstdin=abc123\n"
        );
    }

    #[tokio::test]
    async fn test_login_reports_non_zero_exit_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let cli = write_fake_cli(
            dir.path(),
            "echo 'unauthorized: authentication required' >&2\nexit 3\n",
        );

        let executor = RegistryLoginExecutor::new(cli.to_string_lossy(), "https://gcr.io", "_token");
        let sink = MemorySink::new();

        let code = executor
            .login(&AccessToken::new("abc123"), &sink)
            .await
            .unwrap();

        assert_eq!(code, 3);
        assert!(sink.contains("[stderr] unauthorized: authentication required"));
    }

    #[tokio::test]
    async fn test_login_survives_non_utf8_output() {
        let dir = tempfile::tempdir().unwrap();
        let cli = write_fake_cli(
            dir.path(),
            "cat > /dev/null\nprintf '\\377\\376bad\\n'\nsleep 1\necho 'Login Succeeded'\nexit 0\n",
        );

        let executor = RegistryLoginExecutor::new(cli.to_string_lossy(), "https://gcr.io", "_token");
        let sink = MemorySink::new();

        let code = executor
            .login(&AccessToken::new("abc123"), &sink)
            .await
            .unwrap();

        assert_eq!(code, 0);
        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("bad"));
        assert!(lines[0].contains('\u{FFFD}'));
        assert_eq!(lines[1], "Login Succeeded");
    }

    #[tokio::test]
    async fn test_login_fails_when_cli_missing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-docker");

        let executor =
            RegistryLoginExecutor::new(missing.to_string_lossy(), "https://gcr.io", "_token");
        let sink = MemorySink::new();

        let err = executor
            .login(&AccessToken::new("abc123"), &sink)
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::LoginCommand(_)));
    }
}
