//! CLI argument definitions using the clap derive API.
//!
//! This module is the *only* place that knows about argument names, aliases,
//! help text, and value enums. No business logic lives here.

use clap::{Args, Parser, Subcommand, ValueEnum};

use rapidkit_core::application::reports::{MergeStrategy, ReportedStatus};
use rapidkit_core::domain::ContextValue;

pub mod global;
pub use global::GlobalArgs;

// ── Top-level CLI ─────────────────────────────────────────────────────────────

/// Main CLI entry-point.
#[derive(Debug, Parser)]
#[command(
    name    = "rapidkit",
    bin_name = "rapidkit",
    version  = env!("CARGO_PKG_VERSION"),
    author   = env!("CARGO_PKG_AUTHORS"),
    about    = "\u{26a1} Module-based project generation",
    long_about = "RapidKit creates projects from kits, installs catalog modules into \
                  them and keeps every generated file tracked so later upgrades \
                  never clobber local edits.",
    after_help = "EXAMPLES:\n\
        \x20 rapidkit create my-api --template fastapi.standard\n\
        \x20 rapidkit -p my-api add module free/database/db_postgres\n\
        \x20 rapidkit -p my-api diff all --json\n\
        \x20 rapidkit -p my-api upgrade module free/essentials/settings --dry-run",
    arg_required_else_help = true,
    subcommand_required    = true,
)]
pub struct Cli {
    /// Flags available on every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

// ── Subcommands ───────────────────────────────────────────────────────────────

/// All available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a new project from a kit.
    #[command(
        visible_alias = "new",
        about = "Create a new project",
        after_help = "EXAMPLES:\n\
            \x20 rapidkit create my-api\n\
            \x20 rapidkit create my-api --template nestjs.standard --no-essentials\n\
            \x20 rapidkit create my-api --var install_settings=false"
    )]
    Create(CreateArgs),

    /// Set up the project runtime (virtualenv / node_modules).
    #[command(about = "Initialise the project runtime")]
    Init(JsonFlag),

    /// Install something into the current project.
    #[command(subcommand, about = "Install a module")]
    Add(AddCommands),

    /// Compare tracked files with a fresh render.
    #[command(subcommand, about = "Show file status against the catalog")]
    Diff(DiffCommands),

    /// Re-render modules and write selected files.
    #[command(subcommand, about = "Upgrade installed modules")]
    Upgrade(UpgradeCommands),

    /// Resolve non-clean files of a module.
    #[command(subcommand, about = "Merge template changes with local edits")]
    Merge(MergeCommands),

    /// Catalog maintenance.
    #[command(subcommand, about = "Lock, validate, sign and inspect modules")]
    Modules(ModulesCommands),

    /// Snippet registry maintenance.
    #[command(subcommand, about = "Manage injected snippets")]
    Snippets(SnippetsCommands),

    /// Snapshot maintenance.
    #[command(subcommand, about = "Manage project snapshots")]
    Snapshot(SnapshotCommands),

    /// Snapshot tracked files.
    #[command(about = "Create a project checkpoint")]
    Checkpoint(CheckpointArgs),

    /// Restore a snapshot.
    #[command(about = "Roll back to a checkpoint")]
    Rollback(RollbackArgs),

    /// Environment inspection.
    #[command(subcommand, about = "Check tools and project health")]
    Doctor(DoctorCommands),

    /// Generate shell completion scripts.
    #[command(
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n\
            \x20 rapidkit completions bash > ~/.local/share/bash-completion/completions/rapidkit\n\
            \x20 rapidkit completions zsh  > ~/.zfunc/_rapidkit\n\
            \x20 rapidkit completions fish > ~/.config/fish/completions/rapidkit.fish"
    )]
    Completions(CompletionsArgs),

    /// Inspect the effective configuration.
    #[command(
        about = "Configuration inspection",
        subcommand,
        after_help = "EXAMPLES:\n\
            \x20 rapidkit config get renderer.engine\n\
            \x20 rapidkit config list\n\
            \x20 rapidkit config path"
    )]
    Config(ConfigCommands),
}

// ── shared argument groups ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct JsonFlag {
    /// Print a JSON report instead of text.
    #[arg(long = "json")]
    pub json: bool,
}

/// `--var key=value`, repeatable.
#[derive(Debug, Args)]
pub struct VarArgs {
    #[arg(
        long = "var",
        value_name = "KEY=VALUE",
        value_parser = parse_var,
        help = "Template variable (repeatable)"
    )]
    pub vars: Vec<(String, ContextValue)>,
}

fn parse_var(raw: &str) -> Result<(String, ContextValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), ContextValue::parse_literal(value)))
}

/// Parsed `--only-statuses` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFilter(pub Vec<ReportedStatus>);

fn parse_status_filter(raw: &str) -> Result<StatusFilter, String> {
    ReportedStatus::parse_filter(raw).map(StatusFilter)
}

// ── create ────────────────────────────────────────────────────────────────────

/// Arguments for `rapidkit create`.
#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Project directory name, created under `--project`.
    #[arg(value_name = "NAME", help = "Project name")]
    pub name: String,

    #[arg(
        short = 't',
        long = "template",
        value_name = "KIT",
        default_value = "fastapi.standard",
        help = "Kit to create the project from"
    )]
    pub template: String,

    /// Overwrite an existing directory (destructive).
    #[arg(long = "force", help = "Replace an existing directory")]
    pub force: bool,

    /// Skip the kit's essential modules.
    #[arg(
        long = "no-essentials",
        visible_alias = "no-essential-modules",
        help = "Do not install essential modules"
    )]
    pub no_essentials: bool,

    #[command(flatten)]
    pub checks: SkipVerify,

    #[command(flatten)]
    pub vars: VarArgs,

    #[command(flatten)]
    pub output: JsonFlag,
}

/// Opt-out of the structure and signature checks run before installing.
#[derive(Debug, Args)]
pub struct SkipVerify {
    #[arg(
        long = "skip-verify",
        help = "Install modules whose structure or signature does not check out"
    )]
    pub skip_verify: bool,
}

// ── add ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum AddCommands {
    /// Install one module (and its dependencies).
    Module {
        /// Module slug, e.g. `free/essentials/settings`.
        slug: String,
        #[command(flatten)]
        checks: SkipVerify,
        #[command(flatten)]
        vars: VarArgs,
        #[command(flatten)]
        output: JsonFlag,
    },
}

// ── diff ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum DiffCommands {
    /// Status of every file of one module.
    Module {
        slug: String,
        #[arg(long = "json", conflicts_with = "merge_json")]
        json: bool,
        /// Include base/current/template contents for an external merge tool.
        #[arg(long = "merge-json")]
        merge_json: bool,
    },
    /// Status of every installed module.
    All(JsonFlag),
}

// ── upgrade ───────────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct UpgradeOptions {
    /// Report what would change without writing.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Statuses that may be overwritten (default: new,clean,template_updated).
    #[arg(
        long = "only-statuses",
        value_name = "S1,S2",
        value_parser = parse_status_filter
    )]
    pub only_statuses: Option<StatusFilter>,

    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum UpgradeCommands {
    /// Upgrade one module.
    Module {
        slug: String,
        #[command(flatten)]
        options: UpgradeOptions,
    },
    /// Upgrade several modules; failures do not stop the batch.
    Batch {
        #[arg(long = "modules", value_name = "A,B,C", value_delimiter = ',', required = true)]
        modules: Vec<String>,
        #[command(flatten)]
        options: UpgradeOptions,
    },
}

// ── merge ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Ask per file (t/k/s/q).
    Prompt,
    /// Overwrite with the template.
    PreferTemplate,
    /// Keep local content and accept it as the new baseline.
    KeepLocal,
}

impl From<StrategyArg> for MergeStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Prompt => Self::Prompt,
            StrategyArg::PreferTemplate => Self::PreferTemplate,
            StrategyArg::KeepLocal => Self::KeepLocal,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum MergeCommands {
    /// Merge one module.
    Module {
        slug: String,
        #[arg(long = "strategy", value_enum, default_value = "prompt")]
        strategy: StrategyArg,
        /// Apply `template_updated` files without asking.
        #[arg(long = "auto-apply-template-updated")]
        auto_apply_template_updated: bool,
        #[arg(long = "dry-run")]
        dry_run: bool,
        #[arg(long = "json")]
        json: bool,
    },
}

// ── modules ───────────────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum ModulesCommands {
    /// Pin catalog versions into `.rapidkit/modules.lock.yaml`.
    Lock(JsonFlag),
    /// Compare the lock (or installed ledger) with the catalog.
    Outdated(JsonFlag),
    /// Check manifests and module structure; exits 2 on failure.
    Validate(JsonFlag),
    /// Count modules by tier and status.
    Summary(JsonFlag),
    /// Generate an Ed25519 key pair.
    Keygen(JsonFlag),
    /// Sign every manifest in the catalog.
    SignAll {
        /// Base64 private key.
        #[arg(long = "key", env = "RAPIDKIT_SIGNING_KEY", hide_env_values = true)]
        key: String,
        /// Leave manifests already signed by this key untouched.
        #[arg(long = "skip-unchanged")]
        skip_unchanged: bool,
        #[arg(long = "json")]
        json: bool,
    },
    /// Verify every manifest signature; exits 2 on failure.
    VerifyAll(JsonFlag),
}

// ── snippets ──────────────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum SnippetsCommands {
    /// Apply pending snippets whose producer and owner are installed.
    Reconcile {
        /// Limit to snippets produced by or targeting these modules.
        #[arg(long = "scope", value_name = "A,B", value_delimiter = ',')]
        scope: Option<Vec<String>>,
        #[arg(long = "json")]
        json: bool,
    },
}

// ── snapshots ─────────────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum SnapshotCommands {
    /// Delete all but the newest snapshots.
    Gc {
        /// Snapshots to keep (default: `snapshots.keep`).
        #[arg(long = "keep", value_name = "N")]
        keep: Option<usize>,
        #[arg(long = "dry-run")]
        dry_run: bool,
        #[arg(long = "json")]
        json: bool,
    },
    /// List snapshots, newest last.
    List(JsonFlag),
}

#[derive(Debug, Args)]
pub struct CheckpointArgs {
    #[arg(long = "label", value_name = "TEXT")]
    pub label: Option<String>,
    #[command(flatten)]
    pub output: JsonFlag,
}

#[derive(Debug, Args)]
pub struct RollbackArgs {
    /// Snapshot id (default: the latest).
    #[arg(long = "snapshot", value_name = "ID")]
    pub snapshot: Option<String>,
    #[command(flatten)]
    pub output: JsonFlag,
}

// ── doctor ────────────────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum DoctorCommands {
    /// Probe framework tool requirements.
    Check {
        /// Also inspect the project at `--project`.
        #[arg(long = "workspace")]
        workspace: bool,
        #[arg(long = "json")]
        json: bool,
    },
}

// ── completions ───────────────────────────────────────────────────────────────

/// Arguments for `rapidkit completions`.
#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum, help = "Shell to generate completions for")]
    pub shell: Shell,
}

/// Supported shells for completion generation.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ── config subcommands ────────────────────────────────────────────────────────

/// Subcommands for `rapidkit config`.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the value of a configuration key.
    Get {
        /// Dotted key path, e.g. `renderer.engine`.
        key: String,
    },
    /// Print all configuration values.
    List,
    /// Print the path to the user configuration file.
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_literals_are_typed() {
        assert_eq!(
            parse_var("install_settings=false").unwrap(),
            ("install_settings".into(), ContextValue::Bool(false))
        );
        assert_eq!(
            parse_var("port=8000").unwrap(),
            ("port".into(), ContextValue::Int(8000))
        );
        assert_eq!(
            parse_var("url=postgres://a=b").unwrap(),
            ("url".into(), ContextValue::String("postgres://a=b".into()))
        );
    }

    #[test]
    fn var_without_equals_is_rejected() {
        assert!(parse_var("oops").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[test]
    fn status_filter_parses_lists() {
        let filter = parse_status_filter("clean, template_updated").unwrap();
        assert_eq!(
            filter.0,
            vec![ReportedStatus::Clean, ReportedStatus::TemplateUpdated]
        );
        assert!(parse_status_filter("sideways").is_err());
    }

    #[test]
    fn upgrade_batch_splits_modules() {
        let cli = Cli::try_parse_from([
            "rapidkit",
            "upgrade",
            "batch",
            "--modules=a/b/c,d/e/f",
            "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Commands::Upgrade(UpgradeCommands::Batch { modules, options }) => {
                assert_eq!(modules, vec!["a/b/c", "d/e/f"]);
                assert!(options.dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
