//! `rapidkit checkpoint` and `rapidkit rollback`.

use crate::cli::{CheckpointArgs, RollbackArgs};
use crate::context::AppContext;
use crate::error::CliResult;
use crate::output::OutputManager;

pub fn checkpoint(args: CheckpointArgs, ctx: &AppContext, output: &OutputManager) -> CliResult<()> {
    ctx.open_project()?;
    let snapshot = ctx
        .projects()?
        .checkpoint(&ctx.project, args.label.as_deref())?;
    if output.wants_json(args.output.json) {
        return output.json(&snapshot);
    }
    output.success(&format!(
        "Checkpoint {} ({} files)",
        snapshot.id,
        snapshot.files.len()
    ))?;
    Ok(())
}

pub fn rollback(args: RollbackArgs, ctx: &AppContext, output: &OutputManager) -> CliResult<()> {
    let restored = ctx
        .projects()?
        .rollback(&ctx.project, args.snapshot.as_deref())?;
    if output.wants_json(args.output.json) {
        return output.json(&restored);
    }
    output.success(&format!(
        "Restored {} files from {}",
        restored.restored.len(),
        restored.id
    ))?;
    for file in &restored.missing {
        output.warning(&format!("{file} could not be restored"))?;
    }
    Ok(())
}
