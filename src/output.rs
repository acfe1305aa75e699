use colored::*;
use std::io::{self, Write};

use crate::fetcher::FetchCommand;
use crate::reviewer::REVIEW_CRITERIA;
use crate::shell::escape_double_quoted;

// ============================================================================
// Output
// ============================================================================

/// Tag that opens every diagnostic line and every generated echo.
pub(crate) const PREFIX: &str = "[lgtmit]";

/// Write one diagnostic line to stderr.
pub(crate) fn log(message: &str) {
    eprintln!("{} {}", PREFIX.bright_cyan().bold(), message);
}

/// Text handed back to the calling shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OutputScript {
    /// The fetched script, byte for byte.
    Approved(String),
    /// A generated script that explains the refusal and exits non-zero.
    Refused(String),
}

impl OutputScript {
    pub(crate) fn as_str(&self) -> &str {
        match self {
            OutputScript::Approved(text) | OutputScript::Refused(text) => text,
        }
    }

    pub(crate) fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(self.as_str().as_bytes())?;
        writer.flush()
    }
}

/// Pass an approved script through untouched.
pub(crate) fn compose(script: String) -> OutputScript {
    OutputScript::Approved(script)
}

/// Build the refusal script for `reason` and its supporting `details`.
pub(crate) fn compose_failure(reason: &str, details: &[String]) -> OutputScript {
    let mut lines = vec![
        print_line(&format!("{} This script may not be safe", PREFIX)),
        print_line(&format!("{} Reason: {}", PREFIX, reason)),
    ];
    for detail in details {
        lines.push(print_line(&format!("{}   - {}", PREFIX, detail)));
    }
    lines.push(print_line(&format!("{} Check stderr output for details", PREFIX)));
    lines.push("exit 1".to_string());

    let mut script = lines.join("\n");
    script.push('\n');
    OutputScript::Refused(script)
}

/// Shell statement printing `text` verbatim on its own line.
///
/// `printf '%s'` leaves backslash sequences alone, unlike `echo` in dash.
fn print_line(text: &str) -> String {
    format!("printf '%s\\n' \"{}\"", escape_double_quoted(text))
}

/// Manual review guide shown on stderr for `--dry-run --explain`.
pub(crate) fn build_dry_run_explanation(script: &str, command: &FetchCommand) -> String {
    let source = command.display();
    let criteria: String = REVIEW_CRITERIA
        .iter()
        .map(|c| format!("- {}\n", c))
        .collect();

    let mut script_block = script.to_string();
    if !script_block.ends_with('\n') {
        script_block.push('\n');
    }

    format!(
        "{PREFIX} Dry-run mode: Script fetched but NOT reviewed.
{PREFIX} Please review the following script for security issues before executing.

Source command: {source}

Review criteria:
{criteria}
--- Script content ---
{script_block}--- End of script ---

If the script is safe, run the original command:
  {source} | bash

If unsafe, do NOT execute.
"
    )
}
