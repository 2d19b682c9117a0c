use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::info;

use super::error::{AgentError, Result};

pub const KIND_PYTHON: &str = "python";
pub const KIND_BASH: &str = "bash";

/// Outcome of one script run: `output` holds captured stdout on success,
/// captured stderr otherwise.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub success: bool,
    pub output: String,
}

#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn run(&self, kind: &str, code: &str) -> Result<ExecOutcome>;
}

/// Runs generated scripts through the matching interpreter, feeding the
/// body via stdin so it never lands on a discoverable file path.
pub struct SubprocessExecutor {
    timeout: Duration,
}

impl SubprocessExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn interpreter(kind: &str) -> Result<&'static str> {
        match kind {
            KIND_PYTHON => Ok("python3"),
            KIND_BASH => Ok("bash"),
            other => Err(AgentError::UnsupportedScriptKind(other.to_string())),
        }
    }
}

#[async_trait]
impl ScriptExecutor for SubprocessExecutor {
    async fn run(&self, kind: &str, code: &str) -> Result<ExecOutcome> {
        let program = Self::interpreter(kind)?;

        info!(interpreter = program, bytes = code.len(), "script start");

        let mut child = Command::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(code.as_bytes()).await?;
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                // kill_on_drop reaps the child once the future is dropped
                info!(interpreter = program, "script timed out");
                return Ok(ExecOutcome {
                    success: false,
                    output: format!(
                        "script timed out after {} seconds",
                        self.timeout.as_secs()
                    ),
                });
            }
        };

        let exit = output.status.code().unwrap_or(-1);
        info!(
            interpreter = program,
            exit,
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            "script end"
        );

        if output.status.success() {
            Ok(ExecOutcome {
                success: true,
                output: String::from_utf8_lossy(&output.stdout).to_string(),
            })
        } else {
            Ok(ExecOutcome {
                success: false,
                output: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> SubprocessExecutor {
        SubprocessExecutor::new(Duration::from_secs(30))
    }

    #[tokio::test]
    async fn bash_success_captures_stdout() {
        let outcome = executor().run(KIND_BASH, "echo hello").await.unwrap();
        assert!(outcome.success);
        assert!(outcome.output.contains("hello"));
    }

    #[tokio::test]
    async fn bash_failure_captures_stderr() {
        let outcome = executor()
            .run(KIND_BASH, "echo oops >&2; exit 3")
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.output.contains("oops"));
    }

    #[tokio::test]
    async fn unknown_kind_is_rejected_without_spawning() {
        let err = executor().run("perl", "print 1").await.unwrap_err();
        match err {
            AgentError::UnsupportedScriptKind(kind) => assert_eq!(kind, "perl"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
