use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command as AsyncCommand;

// ============================================================================
// Helpers
// ============================================================================

/// Longest stderr excerpt carried into a failure reason.
const MAX_STDERR_EXCERPT: usize = 200;

/// Stderr bytes kept from a child; the rest is drained and discarded.
const MAX_STDERR_CAPTURE: usize = 64 * 1024;

const READ_CHUNK_SIZE: usize = 8192;

pub(crate) fn new_spinner(msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(msg.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Size in kilobytes with one decimal, e.g. `1.5KB`.
pub(crate) fn format_size_kb(bytes: usize) -> String {
    format!("{:.1}KB", bytes as f64 / 1024.0)
}

/// Describe a failed exit for a log line or failure reason.
///
/// Includes the exit code (or the terminating signal on Unix) and the first
/// non-empty line of the process's stderr, if any.
pub(crate) fn describe_exit(status: &ExitStatus, stderr: &[u8]) -> String {
    let mut description = match status.code() {
        Some(code) => format!("exited with status {}", code),
        None => describe_signal(status),
    };

    if let Some(line) = first_stderr_line(stderr) {
        description.push_str(": ");
        description.push_str(&line);
    }

    description
}

#[cfg(unix)]
fn describe_signal(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => format!("killed by signal {}", signal),
        None => "terminated abnormally".to_string(),
    }
}

#[cfg(not(unix))]
fn describe_signal(_status: &ExitStatus) -> String {
    "terminated abnormally".to_string()
}

fn first_stderr_line(stderr: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(stderr);
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let clean: Vec<char> = line.chars().filter(|c| !c.is_control()).collect();
    if clean.is_empty() {
        return None;
    }

    let mut excerpt: String = clean.iter().take(MAX_STDERR_EXCERPT).collect();
    if clean.len() > MAX_STDERR_EXCERPT || text.trim().lines().count() > 1 {
        excerpt.push_str(" ...");
    }
    Some(excerpt)
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum CaptureError {
    #[error("{0}")]
    Spawn(io::Error),
    #[error("{0}")]
    Io(io::Error),
    #[error("output exceeded {0} bytes")]
    TooLarge(usize),
}

/// Status and captured streams of a child run through [`capture_output`].
#[derive(Debug)]
pub(crate) struct CapturedOutput {
    pub(crate) status: ExitStatus,
    pub(crate) stdout: Vec<u8>,
    pub(crate) stderr: Vec<u8>,
}

/// Run `command` with stdin closed, reading at most `limit` bytes of stdout.
///
/// Reading stops as soon as stdout passes `limit`; the child is spawned with
/// `kill_on_drop`, so returning early (or dropping this future on a timeout)
/// kills it. Stderr is drained concurrently so a chatty child cannot block.
pub(crate) async fn capture_output(
    command: &mut AsyncCommand,
    limit: usize,
) -> Result<CapturedOutput, CaptureError> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(CaptureError::Spawn)?;

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(CaptureError::Io(io::Error::other("child output was not piped")));
    };

    let (stdout, stderr) = tokio::try_join!(
        read_capped(stdout, limit),
        read_truncated(stderr, MAX_STDERR_CAPTURE)
    )?;
    let status = child.wait().await.map_err(CaptureError::Io)?;

    Ok(CapturedOutput {
        status,
        stdout,
        stderr,
    })
}

async fn read_capped(
    mut reader: impl AsyncRead + Unpin,
    limit: usize,
) -> Result<Vec<u8>, CaptureError> {
    let mut body = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut chunk).await.map_err(CaptureError::Io)?;
        if n == 0 {
            return Ok(body);
        }
        if body.len() + n > limit {
            return Err(CaptureError::TooLarge(limit));
        }
        body.extend_from_slice(&chunk[..n]);
    }
}

async fn read_truncated(
    mut reader: impl AsyncRead + Unpin,
    keep: usize,
) -> Result<Vec<u8>, CaptureError> {
    let mut kept = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut chunk).await.map_err(CaptureError::Io)?;
        if n == 0 {
            return Ok(kept);
        }
        let room = keep.saturating_sub(kept.len());
        kept.extend_from_slice(&chunk[..n.min(room)]);
    }
}
