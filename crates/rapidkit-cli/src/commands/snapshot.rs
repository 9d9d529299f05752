//! `rapidkit snapshot gc|list`.

use chrono::Local;

use crate::cli::SnapshotCommands;
use crate::context::AppContext;
use crate::error::CliResult;
use crate::output::OutputManager;

pub fn execute(cmd: SnapshotCommands, ctx: &AppContext, output: &OutputManager) -> CliResult<()> {
    let projects = ctx.projects()?;
    match cmd {
        SnapshotCommands::Gc {
            keep,
            dry_run,
            json,
        } => {
            let keep = keep.unwrap_or(ctx.config.snapshots.keep);
            let report = projects.snapshot_gc(&ctx.project, keep, dry_run)?;
            if output.wants_json(json) {
                return output.json(&report);
            }
            let verb = if dry_run { "Would delete" } else { "Deleted" };
            output.success(&format!(
                "{verb} {} snapshots, kept {}",
                report.deleted, report.kept
            ))?;
            for entry in &report.deleted_entries {
                output.kv("deleted", entry)?;
            }
            for error in &report.errors {
                output.warning(error)?;
            }
        }
        SnapshotCommands::List(flag) => {
            let snapshots = projects.list_snapshots(&ctx.project)?;
            if output.wants_json(flag.json) {
                return output.json(&snapshots);
            }
            if snapshots.is_empty() {
                output.info("No snapshots")?;
            }
            for snapshot in &snapshots {
                let label = snapshot.label.as_deref().unwrap_or("");
                output.kv(
                    &snapshot.id,
                    &format!(
                        "{} files, {} {label}",
                        snapshot.files.len(),
                        snapshot
                            .created_at
                            .with_timezone(&Local)
                            .format("%Y-%m-%d %H:%M:%S")
                    ),
                )?;
            }
        }
    }
    Ok(())
}
