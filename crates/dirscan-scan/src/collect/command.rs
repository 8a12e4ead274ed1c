//! External introspection tools.

use std::ffi::OsStr;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Runs an external program and returns its output.
///
/// Implementations must never fail loudly: a missing program, a non-zero
/// exit status, empty output, or a timeout are all reported as `None`.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and return its trimmed standard output.
    fn run(&self, program: &str, args: &[&OsStr])
    -> impl Future<Output = Option<String>> + Send;
}

/// Runs real processes, without a shell, bounded by a timeout.
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    timeout: Duration,
}

impl SystemCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[&OsStr]) -> Option<String> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        // Dropping the pending future on timeout kills the child.
        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                tracing::debug!(program, "failed to spawn: {err}");
                return None;
            }
            Err(_) => {
                tracing::warn!(program, timeout = ?self.timeout, "command timed out");
                return None;
            }
        };

        if !output.status.success() {
            tracing::debug!(program, status = %output.status, "command failed");
            return None;
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_absent() {
        let runner = SystemCommandRunner::new(Duration::from_secs(5));
        let out = runner
            .run("dirscan-definitely-not-a-real-program", &[OsStr::new("-x")])
            .await;
        assert!(out.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_is_trimmed() {
        let runner = SystemCommandRunner::new(Duration::from_secs(5));
        let out = runner
            .run("echo", &[OsStr::new("  hello  ")])
            .await;
        assert_eq!(out.as_deref(), Some("hello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_absent() {
        let runner = SystemCommandRunner::new(Duration::from_secs(5));
        assert!(runner.run("false", &[]).await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_absent() {
        let runner = SystemCommandRunner::new(Duration::from_millis(100));
        let started = std::time::Instant::now();
        let out = runner.run("sleep", &[OsStr::new("5")]).await;
        assert!(out.is_none());
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
