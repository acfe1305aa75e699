use colored::*;
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;

use crate::helpers::{capture_output, describe_exit, format_size_kb, new_spinner, CaptureError};
use crate::output::log;
use crate::staging::{StagedScript, StagingArea};

// ============================================================================
// Fetcher
// ============================================================================

pub(crate) const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Guard against excessively large scripts (10 MB limit)
const MAX_SCRIPT_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub(crate) enum FetchError {
    #[error("execution failed: {0}")]
    Execution(String),
    #[error("empty result")]
    Empty,
    #[error("invalid output: {0}")]
    InvalidOutput(String),
    #[error("staging failed: {0}")]
    Staging(#[from] std::io::Error),
}

/// The user-supplied command whose stdout is the script, e.g. `curl -fsSL <url>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FetchCommand {
    tokens: Vec<OsString>,
}

impl FetchCommand {
    pub(crate) fn new(tokens: Vec<OsString>) -> Self {
        Self { tokens }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Tokens joined with spaces, for logs only.
    pub(crate) fn display(&self) -> String {
        self.tokens
            .iter()
            .map(|t| t.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Script text captured from a fetch command, staged on disk for review.
#[derive(Debug)]
pub(crate) struct FetchedScript {
    text: String,
    artifact: StagedScript,
}

impl FetchedScript {
    pub(crate) fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn artifact_path(&self) -> &Path {
        self.artifact.path()
    }

    /// Take the text, releasing the staged artifact.
    pub(crate) fn into_text(self) -> String {
        self.text
    }
}

/// Run `command`, capture its stdout as script text and stage it in `staging`.
///
/// Stdin is closed and stderr is captured separately, so prompts cannot block
/// and diagnostics never leak into the script.
pub(crate) async fn fetch_script(
    command: &FetchCommand,
    timeout: Duration,
    staging: &StagingArea,
) -> Result<FetchedScript, FetchError> {
    let Some((program, args)) = command.tokens.split_first() else {
        return Err(FetchError::Execution("no command given".to_string()));
    };

    log(&format!("Executing: {}", command.display()));
    let spinner = new_spinner("Fetching script...");

    let mut child = AsyncCommand::new(program);
    child.args(args);
    let result = tokio::time::timeout(timeout, capture_output(&mut child, MAX_SCRIPT_SIZE)).await;

    spinner.finish_and_clear();

    let output = match result {
        Ok(Ok(output)) => output,
        Ok(Err(CaptureError::Spawn(e))) => {
            return Err(FetchError::Execution(format!(
                "could not run '{}': {}",
                program.to_string_lossy(),
                e
            )))
        }
        Ok(Err(CaptureError::TooLarge(limit))) => {
            return Err(FetchError::InvalidOutput(format!(
                "script too large (over {:.0} MB)",
                limit as f64 / 1_048_576.0
            )))
        }
        Ok(Err(CaptureError::Io(e))) => {
            return Err(FetchError::Execution(format!("reading output failed: {}", e)))
        }
        Err(_) => {
            return Err(FetchError::Execution(format!(
                "timed out after {}s",
                timeout.as_secs()
            )))
        }
    };

    if !output.status.success() {
        return Err(FetchError::Execution(describe_exit(
            &output.status,
            &output.stderr,
        )));
    }

    let text = validate_script(output.stdout)?;
    let artifact = staging.stage(&text)?;

    log(&format!(
        "{} Script fetched ({})",
        "✓".green(),
        format_size_kb(text.len())
    ));

    Ok(FetchedScript { text, artifact })
}

/// Check captured stdout before it is treated as a script.
///
/// Size is already bounded by the capture.
fn validate_script(stdout: Vec<u8>) -> Result<String, FetchError> {
    let text = String::from_utf8(stdout)
        .map_err(|e| FetchError::InvalidOutput(format!("not valid UTF-8 ({})", e.utf8_error())))?;

    if text.trim().is_empty() {
        return Err(FetchError::Empty);
    }

    // Shell scripts never contain NUL; this is a binary or a corrupted download
    if text.contains('\0') {
        return Err(FetchError::InvalidOutput("contains null bytes".to_string()));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> FetchCommand {
        FetchCommand::new(vec!["sh".into(), "-c".into(), script.into()])
    }

    const TIMEOUT: Duration = Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS);

    #[test]
    fn test_validate_script_accepts_text() {
        let text = validate_script(b"#!/bin/bash\necho hi\n".to_vec()).unwrap();
        assert_eq!(text, "#!/bin/bash\necho hi\n");
    }

    #[test]
    fn test_validate_script_rejects_blank() {
        assert!(matches!(validate_script(Vec::new()), Err(FetchError::Empty)));
        assert!(matches!(
            validate_script(b" \n\t \r\n".to_vec()),
            Err(FetchError::Empty)
        ));
    }

    #[test]
    fn test_validate_script_rejects_binary() {
        let err = validate_script(vec![0xff, 0xfe, 0x00]).unwrap_err();
        assert!(err.to_string().starts_with("invalid output: not valid UTF-8"));

        let err = validate_script(b"echo hi\0there".to_vec()).unwrap_err();
        assert_eq!(err.to_string(), "invalid output: contains null bytes");
    }


    #[test]
    fn test_error_messages() {
        assert_eq!(FetchError::Empty.to_string(), "empty result");
        assert_eq!(
            FetchError::Execution("exited with status 6".to_string()).to_string(),
            "execution failed: exited with status 6"
        );
    }

    #[test]
    fn test_display_joins_tokens() {
        let command = FetchCommand::new(vec!["curl".into(), "-fsSL".into(), "https://example.com".into()]);
        assert_eq!(command.display(), "curl -fsSL https://example.com");
        assert!(!command.is_empty());
        assert!(FetchCommand::new(vec![]).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_captures_stdout_and_stages_it() {
        let staging = StagingArea::new().unwrap();
        let fetched = fetch_script(
            &sh("printf '#!/bin/bash\\necho hi\\n'; echo 'progress' >&2"),
            TIMEOUT,
            &staging,
        )
        .await
        .unwrap();

        assert_eq!(fetched.text(), "#!/bin/bash\necho hi\n");
        assert_eq!(
            std::fs::read_to_string(fetched.artifact_path()).unwrap(),
            "#!/bin/bash\necho hi\n"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_releases_artifact_with_text() {
        let staging = StagingArea::new().unwrap();
        let fetched = fetch_script(&sh("echo 'echo hi'"), TIMEOUT, &staging)
            .await
            .unwrap();
        let path = fetched.artifact_path().to_path_buf();

        assert_eq!(fetched.into_text(), "echo hi\n");
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_nonzero_exit() {
        let staging = StagingArea::new().unwrap();
        let err = fetch_script(&sh("echo 'HTTP 404' >&2; exit 22"), TIMEOUT, &staging)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "execution failed: exited with status 22: HTTP 404"
        );
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_missing_program() {
        let staging = StagingArea::new().unwrap();
        let command = FetchCommand::new(vec!["lgtmit-no-such-program".into()]);
        let err = fetch_script(&command, TIMEOUT, &staging).await.unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("execution failed: could not run 'lgtmit-no-such-program'"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_empty_output() {
        let staging = StagingArea::new().unwrap();
        let err = fetch_script(&sh("printf '  \\n\\n'"), TIMEOUT, &staging)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Empty));
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_timeout() {
        let staging = StagingArea::new().unwrap();
        let started = std::time::Instant::now();
        let err = fetch_script(&sh("exec sleep 30"), Duration::from_secs(1), &staging)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "execution failed: timed out after 1s");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_stops_endless_output_at_size_cap() {
        let staging = StagingArea::new().unwrap();
        let started = std::time::Instant::now();
        let err = fetch_script(&sh("exec yes 'echo hi'"), TIMEOUT, &staging)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "invalid output: script too large (over 10 MB)");
        // Well inside the fetch timeout: the command was cut off, not waited out
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_accepts_script_at_size_cap() {
        let staging = StagingArea::new().unwrap();
        let command = sh(&format!("head -c {} /dev/zero | tr '\\000' '#'", MAX_SCRIPT_SIZE));
        let fetched = fetch_script(&command, TIMEOUT, &staging).await.unwrap();
        assert_eq!(fetched.text().len(), MAX_SCRIPT_SIZE);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fetch_does_not_wait_on_stdin() {
        let staging = StagingArea::new().unwrap();
        let fetched = fetch_script(&sh("cat; echo 'echo done'"), TIMEOUT, &staging)
            .await
            .unwrap();
        assert_eq!(fetched.text(), "echo done\n");
    }

    #[tokio::test]
    async fn test_fetch_rejects_empty_command() {
        let staging = StagingArea::new().unwrap();
        let err = fetch_script(&FetchCommand::new(vec![]), TIMEOUT, &staging)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "execution failed: no command given");
    }
}
