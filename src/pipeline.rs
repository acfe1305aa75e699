use colored::*;

use crate::config::Config;
use crate::fetcher::{fetch_script, FetchCommand, FetchError};
use crate::output::{build_dry_run_explanation, compose, compose_failure, log, OutputScript};
use crate::reviewer::Reviewer;
use crate::staging::StagingArea;
use crate::verdict::Verdict;

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RunOptions {
    /// Emit the fetched script without review.
    pub(crate) dry_run: bool,
    /// With `dry_run`, also print a manual review guide to stderr.
    pub(crate) explain: bool,
}

/// Fetch, review and decide. Always returns something safe to pipe into a
/// shell: the approved script, or a refusal script that exits non-zero.
pub(crate) async fn run_pipeline(
    command: &FetchCommand,
    config: &Config,
    options: RunOptions,
) -> OutputScript {
    // Dropped last, after the fetched script's artifact
    let staging = match StagingArea::new() {
        Ok(staging) => staging,
        Err(e) => return refuse(&FetchError::Staging(e).to_string()),
    };

    let fetched = match fetch_script(command, config.fetch_timeout(), &staging).await {
        Ok(fetched) => fetched,
        Err(e) => return refuse(&e.to_string()),
    };

    if options.dry_run {
        log(&"⚠ Dry-run mode: outputting script without review"
            .yellow()
            .bold()
            .to_string());
        if options.explain {
            eprint!("{}", build_dry_run_explanation(fetched.text(), command));
        }
        return compose(fetched.into_text());
    }

    let reviewer = Reviewer::new(config.judge.clone(), config.review_timeout());
    log(&format!("Reviewing with {}...", reviewer.judge()));
    let verdict = reviewer.review(fetched.artifact_path()).await;

    decide(fetched.into_text(), verdict)
}

/// Log `reason` and build a refusal script with no details.
pub(crate) fn refuse(reason: &str) -> OutputScript {
    log(&format!("{} {}", "✗".red(), reason));
    compose_failure(reason, &[])
}

/// Turn a verdict into output. Only `safe = true` lets the script through.
pub(crate) fn decide(script: String, verdict: Verdict) -> OutputScript {
    if verdict.safe {
        log(&format!("Review complete: {}", "safe".green().bold()));
        log(&format!("Reason: {}", verdict.reason));
        return compose(script);
    }

    log(&format!("Review complete: {}", "unsafe".red().bold()));
    log(&format!("Reason: {}", verdict.reason));
    for detail in &verdict.details {
        log(&format!("  - {}", detail));
    }
    compose_failure(&verdict.reason, &verdict.details)
}
