use crate::domain::ToolError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Runs OS utilities with a hard deadline.
///
/// The child is killed when the deadline passes, so a hung `conntrack` or
/// `iptables` never stalls the caller.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    // ---
    timeout: Duration,
}

impl CommandRunner {
    // ---
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `program args...` and returns stdout on a zero exit status.
    pub async fn run(&self, program: &str, args: &[&str]) -> Result<String, ToolError> {
        // ---
        tracing::debug!("exec: {} {}", program, args.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = cmd.output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ToolError::Spawn {
                    program: program.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(ToolError::Timeout {
                    program: program.to_string(),
                    timeout: self.timeout,
                })
            }
        };

        if !output.status.success() {
            return Err(ToolError::Failed {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        // ---
        let runner = CommandRunner::new(Duration::from_secs(2));
        let out = runner.run("echo", &["hello"]).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        // ---
        let runner = CommandRunner::new(Duration::from_secs(2));
        let err = runner
            .run("definitely-not-a-real-binary-xyz", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported() {
        // ---
        let runner = CommandRunner::new(Duration::from_secs(2));
        let err = runner.run("false", &[]).await.unwrap_err();
        assert!(matches!(err, ToolError::Failed { .. }));
    }

    #[tokio::test]
    async fn slow_program_times_out() {
        // ---
        let runner = CommandRunner::new(Duration::from_millis(100));
        let err = runner.run("sleep", &["5"]).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }
}
