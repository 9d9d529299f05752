//! Command handlers. Each module owns one top-level subcommand.

pub mod add;
pub mod checkpoint;
pub mod completions;
pub mod config;
pub mod create;
pub mod diff;
pub mod doctor;
pub mod init;
pub mod merge;
pub mod modules;
pub mod snapshot;
pub mod snippets;
pub mod upgrade;

use rapidkit_core::application::services::ModuleOutcome;
use rapidkit_core::domain::{ContextValue, RenderContext};

use crate::error::CliResult;
use crate::output::OutputManager;

/// Collect repeated `--var` pairs; later duplicates win.
pub(crate) fn vars_context(vars: Vec<(String, ContextValue)>) -> RenderContext {
    vars.into_iter().collect()
}

/// Human summary of one generated module.
pub(crate) fn print_module(output: &OutputManager, outcome: &ModuleOutcome) -> CliResult<()> {
    output.success(&format!(
        "{} {} ({} written, {} unchanged)",
        outcome.module,
        outcome.version,
        outcome.written.len(),
        outcome.unchanged.len()
    ))?;
    for skipped in &outcome.skipped {
        output.warning(&format!("kept {} ({})", skipped.file, skipped.status))?;
    }
    for snippet in &outcome.snippets {
        output.kv(&snippet.key, &snippet.status.to_string())?;
    }
    if let Some(deps) = &outcome.dependencies
        && !deps.added.is_empty()
    {
        output.kv(&deps.manifest_file, &format!("added {}", deps.added.join(", ")))?;
    }
    for warning in &outcome.warnings {
        output.warning(warning)?;
    }
    Ok(())
}
