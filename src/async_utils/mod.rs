//! Helpers for running blocking work and external processes under Tokio.

use crate::prelude::*;

/// Wrapper around [`tokio::task::spawn_blocking`] that propagates panics from
/// the background task.
///
/// Use this for CPU-bound work like decoding and rotating page images, so that
/// we don't stall the executor.
pub async fn spawn_blocking_propagating_panics<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        // Blocking tasks are never aborted by us, so this only happens during
        // runtime shutdown.
        Err(err) => panic!("blocking task failed to complete: {err}"),
    }
}

/// Report any command failures, and include any error output.
///
/// Standard output and standard error are logged at appropriate levels. Lines
/// of standard error may optionally be checked with `is_error_line`, for tools
/// that report some errors without failing.
pub fn check_for_command_failure(
    command_name: &str,
    output: &std::process::Output,
    is_error_line: Option<&dyn Fn(&str) -> bool>,
) -> Result<()> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    trace!(
        command_name = command_name,
        output_len = output.stdout.len(),
        "Standard output from command"
    );
    if !stderr.trim().is_empty() {
        debug!(
            command_name = command_name,
            output = %stderr,
            "Standard error from command",
        );
    }

    if output.status.success() {
        if let Some(is_error_line) = is_error_line
            && let Some(line) = stderr.lines().find(|line| is_error_line(line))
        {
            return Err(anyhow!("{} printed error output: {}", command_name, line));
        }
        Ok(())
    } else if let Some(exit_code) = output.status.code() {
        Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr,
        ))
    } else {
        Err(anyhow!(
            "{} failed with error output:\n{}",
            command_name,
            stderr,
        ))
    }
}
