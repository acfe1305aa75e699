mod config;
mod fetcher;
mod helpers;
mod output;
mod pipeline;
mod reviewer;
mod shell;
mod staging;
mod verdict;

use clap::error::ErrorKind;
use clap::Parser;
use colored::*;
use std::ffi::OsString;
use std::io;
use std::process::ExitCode;

use crate::config::{Config, Overrides};
use crate::fetcher::FetchCommand;
use crate::output::{log, OutputScript};
use crate::pipeline::{refuse, run_pipeline, RunOptions};

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "lgtmit", version)]
#[command(about = "Review curl | bash install scripts with an external judge before they reach your shell", long_about = None)]
#[command(override_usage = "lgtmit [OPTIONS] -- <COMMAND>...")]
struct Cli {
    /// Fetch and output the script without review
    #[arg(long)]
    dry_run: bool,

    /// Print a manual review guide to stderr (requires --dry-run)
    #[arg(long, requires = "dry_run")]
    explain: bool,

    /// Judge program, invoked as `<judge> -p <prompt> <file>`
    #[arg(long, value_name = "PROGRAM", env = "LGTMIT_JUDGE")]
    judge: Option<String>,

    /// Timeout in seconds for the fetch command
    #[arg(long, value_name = "SECS")]
    fetch_timeout: Option<u64>,

    /// Timeout in seconds for the judge
    #[arg(long, value_name = "SECS")]
    review_timeout: Option<u64>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            judge: self.judge.clone(),
            fetch_timeout: self.fetch_timeout,
            review_timeout: self.review_timeout,
        }
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            dry_run: self.dry_run,
            explain: self.explain,
        }
    }
}

/// Split the raw argument vector at the first `--`.
///
/// Everything before it (program name included) is parsed as flags; everything
/// after it is the fetch command, passed through untouched.
fn split_invocation(mut args: Vec<OsString>) -> (Vec<OsString>, Vec<OsString>) {
    let separator = args.iter().skip(1).position(|arg| arg == "--");
    match separator {
        Some(pos) => {
            let command = args.split_off(pos + 2);
            args.truncate(pos + 1);
            (args, command)
        }
        None => (args, Vec::new()),
    }
}

fn print_usage() {
    log("Usage: lgtmit [--dry-run] -- <command...>");
    log("");
    log("Examples:");
    log(&format!(
        "  {}",
        "lgtmit -- curl -fsSL https://example.com/install.sh | bash".green()
    ));
    log(&format!(
        "  {}",
        "lgtmit --dry-run -- curl -fsSL https://example.com/install.sh".green()
    ));
    log("");
    log("Options:");
    log("  --dry-run                Fetch and output the script without review");
    log("  --explain                With --dry-run, print a manual review guide");
    log("  --judge <PROGRAM>        Judge program (default: claude)");
    log("  --fetch-timeout <SECS>   Timeout for the fetch command (default: 30)");
    log("  --review-timeout <SECS>  Timeout for the judge (default: 60)");
    log("");
    log(&format!("For more help: {}", "lgtmit --help".cyan()));
}

// ============================================================================
// Signals
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Interrupt,
    Terminate,
}

impl Interrupt {
    fn name(self) -> &'static str {
        match self {
            Interrupt::Interrupt => "SIGINT",
            Interrupt::Terminate => "SIGTERM",
        }
    }

    /// Conventional `128 + signal number` status.
    fn exit_code(self) -> u8 {
        match self {
            Interrupt::Interrupt => 130,
            Interrupt::Terminate => 143,
        }
    }
}

async fn wait_for_interrupt() -> Interrupt {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log(&format!("Could not listen for Ctrl+C: {}", e));
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => Interrupt::Interrupt,
        _ = wait_for_sigterm() => Interrupt::Terminate,
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            log(&format!("Could not listen for SIGTERM: {}", e));
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}

// ============================================================================
// Main
// ============================================================================

async fn run(cli: &Cli, command: &FetchCommand) -> OutputScript {
    let config = match Config::load().and_then(|config| {
        let config = config.with_overrides(cli.overrides());
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => return refuse(&format!("configuration error: {:#}", e)),
    };

    run_pipeline(command, &config, cli.run_options()).await
}

/// Reason carried by the failure script when flags before `--` do not parse.
fn argument_error_reason(err: &clap::Error) -> String {
    match err.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        | ErrorKind::DisplayVersion => {
            "invalid arguments: help or version requested alongside a command".to_string()
        }
        kind => match kind.as_str() {
            Some(cause) => format!("invalid arguments: {}", cause),
            None => "invalid arguments".to_string(),
        },
    }
}

/// Write `output` to stdout, exiting with `status` once it is fully written.
fn emit(output: &OutputScript, status: ExitCode) -> ExitCode {
    match output.write_to(&mut io::stdout().lock()) {
        Ok(()) => status,
        Err(e) => {
            log(&format!("{} Failed to write output: {}", "✗".red(), e));
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let (flags, command) = split_invocation(std::env::args_os().collect());
    let command = FetchCommand::new(command);

    let cli = match Cli::try_parse_from(flags) {
        Ok(cli) => cli,
        Err(e) if !command.is_empty() => {
            // Stdout belongs to the calling shell; help text and errors go to stderr
            eprint!("{}", e.render());
            let output = refuse(&argument_error_reason(&e));
            return emit(&output, ExitCode::SUCCESS);
        }
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(_) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
    };

    if command.is_empty() {
        print_usage();
        return ExitCode::SUCCESS;
    }

    // Cancelling the pipeline drops its child processes and staged files
    tokio::select! {
        biased;

        interrupt = wait_for_interrupt() => {
            let output = refuse(&format!("interrupted by {}", interrupt.name()));
            emit(&output, ExitCode::from(interrupt.exit_code()))
        }

        output = run(&cli, &command) => emit(&output, ExitCode::SUCCESS),
    }
}
