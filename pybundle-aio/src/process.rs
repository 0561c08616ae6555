// pybundle-aio/src/process.rs
use std::path::Path;
use std::process::{Output, Stdio};

use pybundle_common::error::{BundleError, Result};
use tokio::process::Command;
use tracing::debug;

/// Asynchronously runs an external command and captures its output.
/// The returned output is not checked for success.
pub async fn run_command_async(program: &str, args: &[String], cwd: Option<&Path>) -> Result<Output> {
    debug!("Async Running command: {} {:?} (cwd: {:?})", program, args, cwd);

    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.stdin(Stdio::null());

    let output = cmd.output().await.map_err(|e| {
        BundleError::CommandExecError(format!("Failed to spawn '{program}': {e}"))
    })?;
    if output.status.success() {
        debug!("Async Command finished successfully.");
    } else {
        debug!("Async Command failed with status: {}", output.status);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("Stderr:\n{}", stderr.trim());
        }
    }
    Ok(output)
}

/// Like [`run_command_async`], but a non-zero exit becomes an error carrying
/// the tail of stderr.
pub async fn run_checked(program: &str, args: &[String], cwd: Option<&Path>) -> Result<Output> {
    let output = run_command_async(program, args, cwd).await?;
    if output.status.success() {
        return Ok(output);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
    let tail: Vec<&str> = tail.into_iter().rev().collect();
    Err(BundleError::CommandExecError(format!(
        "'{} {}' exited with {}: {}",
        program,
        args.join(" "),
        output.status,
        tail.join(" | ")
    )))
}
