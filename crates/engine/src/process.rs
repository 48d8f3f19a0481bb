// SPDX-License-Identifier: MIT

//! Subprocess execution helpers shared by the materialize/prepare phases
//! and the worker run phase.

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

pub const MATERIALIZE_TIMEOUT: Duration = Duration::from_secs(120);
pub const PREPARE_TIMEOUT: Duration = Duration::from_secs(120);

/// Run `cmd` to completion, killing it if `timeout` elapses first.
///
/// Mirrors the corpus's `run_with_timeout(cmd, duration, label)` pattern:
/// on timeout the child is killed rather than left to linger, and the
/// label is only used for the error message, not for any side effect.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    label: &str,
) -> Result<Output, String> {
    let child = cmd.spawn().map_err(|e| format!("{label}: failed to spawn: {e}"))?;
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(format!("{label}: failed: {e}")),
        Err(_) => Err(format!("{label}: timed out after {}ms", timeout.as_millis())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_returns_its_output() {
        let mut cmd = Command::new("true");
        cmd.kill_on_drop(true);
        let output = run_with_timeout(cmd, Duration::from_secs(5), "true").await.expect("ok");
        assert!(output.status.success());
    }

    #[tokio::test]
    async fn failing_command_still_returns_output() {
        let mut cmd = Command::new("false");
        cmd.kill_on_drop(true);
        let output = run_with_timeout(cmd, Duration::from_secs(5), "false").await.expect("ok");
        assert!(!output.status.success());
    }

    #[tokio::test]
    async fn a_hanging_command_times_out() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5").kill_on_drop(true);
        let result = run_with_timeout(cmd, Duration::from_millis(50), "sleep").await;
        assert!(result.unwrap_err().contains("timed out"));
    }
}
