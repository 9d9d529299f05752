//! `rapidkit snippets reconcile`.

use rapidkit_core::application::reports::{ReconcileReport, SNIPPETS_RECONCILE_SCHEMA};

use crate::cli::SnippetsCommands;
use crate::context::AppContext;
use crate::error::CliResult;
use crate::output::OutputManager;

pub fn execute(cmd: SnippetsCommands, ctx: &AppContext, output: &OutputManager) -> CliResult<()> {
    let SnippetsCommands::Reconcile { scope, json } = cmd;
    let mut state = ctx.open_project()?;
    let stats = ctx
        .generator()
        .snippets()
        .reconcile(&mut state, scope.as_deref())?;
    let report = ReconcileReport {
        schema_version: SNIPPETS_RECONCILE_SCHEMA,
        scope,
        stats,
    };

    if output.wants_json(json) {
        return output.json(&report);
    }
    let stats = &report.stats;
    if stats.pending_before == 0 {
        return output.info("No pending snippets").map_err(Into::into);
    }
    output.success(&format!(
        "Applied {} of {} pending snippets",
        stats.applied, stats.pending_before
    ))?;
    if stats.failed > 0 {
        output.warning(&format!("{} failed", stats.failed))?;
    }
    if stats.pending_after > 0 {
        output.info(&format!(
            "{} still waiting for their owner module",
            stats.pending_after
        ))?;
    }
    Ok(())
}
