//! Bounded execution of external controller commands.

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::error::AdapterError;

/// Run `program args...` in `dir`, capturing output.
///
/// The child is killed if it outlives `timeout`, and also if the returned
/// future is dropped early (`kill_on_drop`).
pub async fn run_with_timeout(
    program: &str,
    args: &[&str],
    dir: &Path,
    timeout: Duration,
) -> Result<Output, AdapterError> {
    let command = format!("{program} {}", args.join(" "));
    debug!(command = %command, dir = %dir.display(), "Running controller command");

    let mut child = tokio::process::Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| AdapterError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let mut stdout_handle = child.stdout.take();
    let mut stderr_handle = child.stderr.take();

    tokio::select! {
        result = async {
            let (status, stdout, stderr) = tokio::join!(
                child.wait(),
                async {
                    let mut buf = Vec::new();
                    if let Some(ref mut h) = stdout_handle {
                        if let Err(e) = h.read_to_end(&mut buf).await {
                            debug!(program, error = %e, "Failed reading stdout");
                        }
                    }
                    buf
                },
                async {
                    let mut buf = Vec::new();
                    if let Some(ref mut h) = stderr_handle {
                        if let Err(e) = h.read_to_end(&mut buf).await {
                            debug!(program, error = %e, "Failed reading stderr");
                        }
                    }
                    buf
                },
            );
            let status = status.map_err(|source| AdapterError::Spawn {
                program: program.to_string(),
                source,
            })?;
            Ok(Output { status, stdout, stderr })
        } => result,
        () = tokio::time::sleep(timeout) => {
            if let Err(e) = child.kill().await {
                debug!(program, error = %e, "Failed to kill timed-out command");
            }
            Err(AdapterError::Timeout { command, secs: timeout.as_secs() })
        }
    }
}

/// Like [`run_with_timeout`], but a non-zero exit becomes [`AdapterError::CommandFailed`].
pub async fn run_checked(
    program: &str,
    args: &[&str],
    dir: &Path,
    timeout: Duration,
) -> Result<Output, AdapterError> {
    let output = run_with_timeout(program, args, dir, timeout).await?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(AdapterError::CommandFailed {
            command: format!("{program} {}", args.join(" ")),
            code: output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string()),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let output = run_checked("sh", &["-c", "echo hello"], dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_command_failed() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_checked(
            "sh",
            &["-c", "echo nope >&2; exit 3"],
            dir.path(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        match err {
            AdapterError::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, "3");
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_with_timeout("sleep", &["5"], dir.path(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Timeout { secs: 0, .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_with_timeout(
            "definitely-not-a-real-binary-xyz",
            &[],
            dir.path(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AdapterError::Spawn { .. }));
    }
}
