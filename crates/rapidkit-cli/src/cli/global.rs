//! Flags accepted by every subcommand, flattened into [`super::Cli`].

use clap::Args;
use std::path::PathBuf;

/// Global arguments for all commands.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// `-v` info, `-vv` debug, `-vvv` trace. `RUST_LOG` still wins.
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        global = true,
        help = "Increase verbosity (-v, -vv, -vvv)",
        long_help = "Log verbosity on stderr. Warnings only by default; \
                     -v adds progress, -vv diagnostics, -vvv everything."
    )]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(
        short = 'q',
        long = "quiet",
        global = true,
        conflicts_with = "verbose",
        help = "Suppress non-error output"
    )]
    pub quiet: bool,

    /// Also set by `NO_COLOR`; any value other than empty, `0`, `false`,
    /// `no` or `off` turns color off.
    #[arg(
        long = "no-color",
        global = true,
        env = "NO_COLOR",
        value_parser = clap::builder::FalseyValueParser::new(),
        help = "Disable colored output"
    )]
    pub no_color: bool,

    /// Layered on top of the user and project files; must exist.
    #[arg(
        short = 'c',
        long = "config",
        global = true,
        value_name = "FILE",
        help = "Extra configuration file"
    )]
    pub config: Option<PathBuf>,

    /// Machine-readable output format.
    #[arg(
        long = "output-format",
        global = true,
        value_enum,
        default_value = "auto",
        help = "Output format"
    )]
    pub output_format: OutputFormat,

    /// Project root the command operates on.
    #[arg(
        short = 'p',
        long = "project",
        global = true,
        value_name = "DIR",
        default_value = ".",
        help = "Project directory"
    )]
    pub project: PathBuf,

    /// Module catalog root; overrides `modules_root` from the configuration.
    #[arg(long = "modules-root", global = true, value_name = "DIR")]
    pub modules_root: Option<PathBuf>,

    /// Kit root; overrides `kits_root` from the configuration.
    #[arg(long = "kits-root", global = true, value_name = "DIR")]
    pub kits_root: Option<PathBuf>,
}

/// How the CLI should render its output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human on a terminal, plain otherwise.
    #[default]
    Auto,
    Human,
    Plain,
    /// Every report as JSON, as if `--json` were given.
    Json,
}
