//! Run [Command]s as child processes of the node client binary.

use crate::{Command, Error, Executor, Output};
use std::{path::PathBuf, process::Stdio, time::Duration};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default bound on how long one invocation may run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(130);

/// An [Executor] that spawns `<base_binary> <args>` from a working directory.
#[derive(Clone, Debug)]
pub struct Process {
    base_binary: String,
    working_dir: PathBuf,
    timeout: Duration,
}

impl Process {
    pub fn new(base_binary: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_binary: base_binary.into(),
            working_dir: working_dir.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Executor for Process {
    async fn execute(&self, command: &Command) -> Result<Output, Error> {
        let child = tokio::process::Command::new(&self.base_binary)
            .args(command.args())
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        // Dropping the pending future kills the child
        let Ok(result) = timeout(self.timeout, child).await else {
            warn!(%command, timeout = ?self.timeout, "command timed out");
            return Ok(Output::failed(format!(
                "timed out after {:?}: {} {}",
                self.timeout, self.base_binary, command
            )));
        };
        let output = result.map_err(|source| Error::Spawn {
            binary: self.base_binary.clone(),
            source,
        })?;

        let output = Output::classify(
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
        debug!(%command, success = output.success, "command finished");
        Ok(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::VALID_MARKER;

    /// Runs `sh client <args>` so the script needs no execute permission.
    fn script(body: &str) -> (tempfile::TempDir, Process) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("client"), body).unwrap();
        let process = Process::new("sh", dir.path());
        (dir, process)
    }

    #[tokio::test]
    async fn test_captures_output() {
        let (_dir, process) = script(&format!(
            "echo \"$@\"\necho \"{VALID_MARKER}\"\necho 'Skipping key 2' >&2\n"
        ));
        let output = process
            .execute(&Command::epoch().at("node:1"))
            .await
            .unwrap();
        assert!(output.success);
        assert!(output.stdout.starts_with("epoch --ledger-address node:1\n"));
        assert_eq!(output.stderr, "Skipping key 2\n");
    }

    #[tokio::test]
    async fn test_failure_is_not_an_error() {
        let (_dir, process) = script("echo 'Error: unable to connect' >&2\nexit 1\n");
        let output = process.execute(&Command::validators()).await.unwrap();
        assert!(!output.success);
        assert!(output.stderr.contains("unable to connect"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let (_dir, process) = script("sleep 5\n");
        let process = process.with_timeout(Duration::from_millis(100));
        let output = process.execute(&Command::epoch()).await.unwrap();
        assert!(!output.success);
        assert!(output.stderr.starts_with("timed out"));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let process = Process::new("stampede-missing-binary", dir.path());
        let result = process.execute(&Command::epoch()).await;
        assert!(matches!(result, Err(Error::Spawn { .. })));
    }
}
