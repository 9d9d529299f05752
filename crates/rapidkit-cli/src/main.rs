//! # RapidKit CLI
//!
//! Module-based project generation with tracked, mergeable output.
//!
//! ## Startup sequence
//!
//! 1. Load `.env`, then parse CLI arguments (clap handles `--help` /
//!    `--version` early-exit).
//! 2. Load configuration (defaults, files, `RAPIDKIT_*` env).
//! 3. Initialise the tracing subscriber (stderr plus optional log file).
//! 4. Build the [`OutputManager`] and the [`AppContext`].
//! 5. Dispatch to the appropriate command handler.
//! 6. Translate any [`CliError`] into a user-facing message and exit code.
//!
//! ## Exit codes
//!
//! | Code | Meaning                                        |
//! |------|------------------------------------------------|
//! |  0   | Success                                        |
//! |  1   | User error / internal error                    |
//! |  2   | Validation failure or bad arguments            |
//! |  3   | Resource not found                             |
//! |  4   | Configuration error                            |

use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, info, instrument};

use crate::{
    cli::{Cli, Commands},
    config::AppConfig,
    context::AppContext,
    error::{CliError, CliResult},
    logging::init_logging,
    output::OutputManager,
};

mod cli;
mod commands;
mod config;
mod context;
mod error;
mod logging;
mod output;
mod prompt;

fn main() -> ExitCode {
    // No .env is not an error.
    let _ = dotenvy::dotenv();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version come through here too, with exit code 0.
            let code = e.exit_code();
            let _ = e.print();
            return ExitCode::from(u8::try_from(code).unwrap_or(2));
        }
    };

    let config = match AppConfig::load(cli.global.config.as_ref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::from(4);
        }
    };

    let _log_guard = match init_logging(&cli.global, config.logging.file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialise logging: {e:#}");
            return ExitCode::from(1);
        }
    };

    debug!(
        verbose = cli.global.verbose,
        quiet = cli.global.quiet,
        no_color = cli.global.no_color,
        project = %cli.global.project.display(),
        "CLI started"
    );

    let output = OutputManager::new(&cli.global, &config);
    let verbose = cli.global.verbose > 0;

    match run(cli, config, &output) {
        Ok(()) => {
            info!("RapidKit completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => handle_error(e, verbose),
    }
}

/// Dispatch to the correct command handler.
#[instrument(skip_all)]
fn run(cli: Cli, config: AppConfig, output: &OutputManager) -> CliResult<()> {
    // These two never touch the catalog.
    let command = match cli.command {
        Commands::Completions(args) => return commands::completions::execute(args),
        Commands::Config(cmd) => return commands::config::execute(cmd, &config, output),
        other => other,
    };

    let ctx = AppContext::build(&cli.global, config)?;
    match command {
        Commands::Create(args) => commands::create::execute(args, &ctx, output),
        Commands::Init(args) => commands::init::execute(args, &ctx, output),
        Commands::Add(cmd) => commands::add::execute(cmd, &ctx, output),
        Commands::Diff(cmd) => commands::diff::execute(cmd, &ctx, output),
        Commands::Upgrade(cmd) => commands::upgrade::execute(cmd, &ctx, output),
        Commands::Merge(cmd) => commands::merge::execute(cmd, &ctx, output),
        Commands::Modules(cmd) => commands::modules::execute(cmd, &ctx, output),
        Commands::Snippets(cmd) => commands::snippets::execute(cmd, &ctx, output),
        Commands::Snapshot(cmd) => commands::snapshot::execute(cmd, &ctx, output),
        Commands::Checkpoint(args) => commands::checkpoint::checkpoint(args, &ctx, output),
        Commands::Rollback(args) => commands::checkpoint::rollback(args, &ctx, output),
        Commands::Doctor(cmd) => commands::doctor::execute(cmd, &ctx, output),
        Commands::Completions(_) | Commands::Config(_) => Ok(()),
    }
}

/// Translate a `CliError` into a user message and an exit code.
fn handle_error(err: CliError, verbose: bool) -> ExitCode {
    err.log();

    let msg = if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        err.format_colored(verbose)
    } else {
        err.format_plain(verbose)
    };
    eprint!("{msg}");

    ExitCode::from(err.exit_code())
}

// ── tests ─────────────────────────────────────────────────────────────────────
