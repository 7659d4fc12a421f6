//! Post-upload hook execution: runs a configured command after a job
//! completes, substituting `{nzb_path}` and bounding both the per-attempt
//! timeout and the total retry budget.

use crate::config::PostUploadScriptConfig;
use crate::error::{Error, HookError, Result};
use crate::retry::with_retry;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Run the configured post-upload hook against `nzb_path`. A no-op if the
/// hook is disabled or no command is configured.
pub(crate) async fn run(config: &PostUploadScriptConfig, nzb_path: &Path) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }
    let Some(command_template) = config.command.as_deref() else {
        return Ok(());
    };

    let command_line = command_template.replace("{nzb_path}", &nzb_path.to_string_lossy());
    let working_dir = nzb_path.parent().map(Path::to_path_buf);
    let retry_config = config.retry_config();
    let attempt_timeout = config.timeout;

    let attempt = with_retry(&retry_config, || {
        let command_line = command_line.clone();
        let working_dir = working_dir.clone();
        async move { run_once(&command_line, working_dir.as_deref(), attempt_timeout).await }
    });

    match tokio::time::timeout(config.max_retry_duration, attempt).await {
        Ok(result) => result.map_err(Error::HookFailed),
        Err(_) => Err(Error::HookFailed(HookError::RetryBudgetExhausted {
            elapsed_secs: config.max_retry_duration.as_secs(),
        })),
    }
}

async fn run_once(
    command_line: &str,
    working_dir: Option<&Path>,
    timeout: Duration,
) -> std::result::Result<(), HookError> {
    let mut command = shell_command(command_line);
    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }
    command.stdout(Stdio::null()).stderr(Stdio::piped());

    let child = command
        .spawn()
        .map_err(|e| HookError::SpawnFailed(e.to_string()))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| HookError::Timeout {
            timeout_secs: timeout.as_secs(),
        })?
        .map_err(|e| HookError::SpawnFailed(e.to_string()))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(HookError::NonZeroExit {
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(unix)]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(command_line);
    command
}

#[cfg(not(unix))]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(command_line);
    command
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn config(command: &str) -> PostUploadScriptConfig {
        PostUploadScriptConfig {
            enabled: true,
            command: Some(command.to_string()),
            timeout: Duration::from_secs(5),
            max_retries: 0,
            retry_delay: Duration::from_millis(1),
            max_retry_duration: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn disabled_hook_is_a_no_op() {
        let mut cfg = config("exit 1");
        cfg.enabled = false;
        assert!(run(&cfg, Path::new("/tmp/out.nzb")).await.is_ok());
    }

    #[tokio::test]
    async fn missing_command_is_a_no_op() {
        let mut cfg = config("true");
        cfg.command = None;
        assert!(run(&cfg, Path::new("/tmp/out.nzb")).await.is_ok());
    }

    #[tokio::test]
    async fn successful_command_substitutes_nzb_path() {
        let dir = std::env::temp_dir();
        let nzb_path = dir.join("hook_test_marker.nzb");
        let marker = dir.join("hook_test_marker.touched");
        let _ = std::fs::remove_file(&marker);
        let cfg = config(&format!("touch {}", marker.display()));
        let result = run(&cfg, &nzb_path).await;
        assert!(result.is_ok());
        assert!(marker.exists());
        let _ = std::fs::remove_file(&marker);
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_hook_failed() {
        let cfg = config("exit 7");
        let result = run(&cfg, Path::new("/tmp/out.nzb")).await;
        assert!(matches!(result, Err(Error::HookFailed(_))));
    }
}
