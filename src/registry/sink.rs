// Caller-supplied log sinks

/// Append-only line stream owned by whoever drives the session.
///
/// Login command output and the fixed failure messages are written here.
pub trait LogSink: Send + Sync {
    /// Append a line of ordinary output.
    fn line(&self, line: &str);

    /// Append a fatal error line.
    fn fatal(&self, message: &str) {
        self.line(&format!("FATAL: {}", message));
    }
}

/// Prints sink lines verbatim, fatal lines on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn line(&self, line: &str) {
        println!("{}", line);
    }

    fn fatal(&self, message: &str) {
        eprintln!("FATAL: {}", message);
    }
}

/// Collects lines in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemorySink {
    lines: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

#[cfg(test)]
impl LogSink for MemorySink {
    fn line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_keeps_order_and_marks_fatal() {
        let sink = MemorySink::new();
        sink.line("Login Succeeded");
        sink.fatal("Could not write .dockercfg");

        assert_eq!(
            sink.lines(),
            vec![
                "Login Succeeded".to_string(),
                "FATAL: Could not write .dockercfg".to_string()
            ]
        );
        assert!(sink.contains("Could not write"));
    }
}
