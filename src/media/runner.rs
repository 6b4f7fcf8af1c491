//! External tool execution for codec backends.
//!
//! Every transcode shells out to a tool (ffmpeg, a SILK codec, rlottie) or
//! runs CPU-bound work in-process. Both go through [`ToolRunner`], which caps
//! how many run at once so a burst of video conversions cannot starve the
//! event loop or the machine.

use std::ffi::OsStr;
use std::fmt::Display;
use std::future::Future;
use std::path::Path;
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::error::MediaError;

/// Longest stderr excerpt kept in a [`MediaError::ToolFailed`].
const STDERR_TAIL: usize = 400;

/// Bounded pool for tool invocations and blocking codec work.
#[derive(Clone)]
pub struct ToolRunner {
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl ToolRunner {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    /// Run `program` with `args` and return its output.
    ///
    /// A missing binary is reported as [`MediaError::ToolUnavailable`], a
    /// non-zero exit as [`MediaError::ToolFailed`]. The child is killed when
    /// the timeout fires.
    pub async fn run<I, S>(&self, program: &Path, args: I) -> Result<Output, MediaError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let tool = tool_name(program);
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| MediaError::ProcessingFailed {
                reason: "tool runner shut down".to_string(),
            })?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(tool = %tool, "Spawning codec tool");

        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                MediaError::ToolUnavailable {
                    tool: tool.clone(),
                    reason: e.to_string(),
                }
            }
            _ => MediaError::Io(e),
        })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| MediaError::Timeout {
                tool: tool.clone(),
                timeout: self.timeout,
            })??;

        if !output.status.success() {
            return Err(MediaError::ToolFailed {
                tool,
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        Ok(output)
    }

    /// Run CPU-bound work on the blocking pool, counted against the same
    /// concurrency limit as tool invocations.
    pub async fn run_blocking<F, T>(&self, work: F) -> Result<T, MediaError>
    where
        F: FnOnce() -> Result<T, MediaError> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| MediaError::ProcessingFailed {
                reason: "tool runner shut down".to_string(),
            })?;

        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| MediaError::ProcessingFailed {
                reason: format!("blocking codec task failed: {}", e),
            })?
    }
}

/// Try each strategy in order until one yields non-empty output.
///
/// The last failure is returned when every strategy fails.
pub async fn first_success<S, F, Fut>(
    what: &str,
    strategies: &[S],
    mut attempt: F,
) -> Result<Bytes, MediaError>
where
    S: Copy + Display,
    F: FnMut(S) -> Fut,
    Fut: Future<Output = Result<Bytes, MediaError>>,
{
    let mut last_error = None;

    for &strategy in strategies {
        match attempt(strategy).await {
            Ok(output) if !output.is_empty() => {
                tracing::debug!(what, strategy = %strategy, bytes = output.len(), "Strategy succeeded");
                return Ok(output);
            }
            Ok(_) => {
                tracing::warn!(what, strategy = %strategy, "Strategy produced empty output");
                last_error = Some(MediaError::EmptyOutput);
            }
            Err(e) => {
                tracing::warn!(what, strategy = %strategy, error = %e, "Strategy failed, trying next");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| MediaError::ProcessingFailed {
        reason: format!("no strategy available for {}", what),
    }))
}

/// Read a tool's output file, treating a missing or empty file as failure.
pub async fn read_output(path: &Path) -> Result<Bytes, MediaError> {
    match tokio::fs::read(path).await {
        Ok(data) if !data.is_empty() => Ok(Bytes::from(data)),
        Ok(_) => Err(MediaError::EmptyOutput),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MediaError::EmptyOutput),
        Err(e) => Err(MediaError::Io(e)),
    }
}

/// Fresh scratch directory for one strategy attempt.
pub fn scratch_dir() -> Result<tempfile::TempDir, MediaError> {
    Ok(tempfile::Builder::new().prefix("chatbridge-").tempdir()?)
}

fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.display().to_string())
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map(|(i, _)| i)
        .unwrap_or(0);
    text[start..].to_string()
}
