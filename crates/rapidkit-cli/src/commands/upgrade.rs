//! `rapidkit upgrade module|batch`.

use rapidkit_core::application::reports::{ReportedStatus, UpgradeReport};

use crate::cli::{UpgradeCommands, UpgradeOptions};
use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::OutputManager;

pub fn execute(cmd: UpgradeCommands, ctx: &AppContext, output: &OutputManager) -> CliResult<()> {
    let mut state = ctx.open_project()?;
    let diff = ctx.diff();
    match cmd {
        UpgradeCommands::Module { slug, options } => {
            let only = filter(&options);
            let report = diff.upgrade_module(&mut state, &slug, only, options.dry_run)?;
            if output.wants_json(options.json) {
                return output.json(&report);
            }
            print_upgrade(output, &report)
        }
        UpgradeCommands::Batch { modules, options } => {
            let only = filter(&options);
            let report = diff.upgrade_batch(&mut state, &modules, only, options.dry_run);
            if output.wants_json(options.json) {
                output.json(&report)?;
            } else {
                for module in &report.modules {
                    print_upgrade(output, module)?;
                }
                for failure in &report.errors {
                    output.error(&format!("{}: {}", failure.module, failure.error))?;
                }
            }
            if report.errors.is_empty() {
                Ok(())
            } else {
                Err(CliError::BatchFailed {
                    failed: report.errors.len(),
                    total: modules.len(),
                })
            }
        }
    }
}

fn filter(options: &UpgradeOptions) -> Option<&[ReportedStatus]> {
    options.only_statuses.as_ref().map(|f| f.0.as_slice())
}

fn print_upgrade(output: &OutputManager, report: &UpgradeReport) -> CliResult<()> {
    let from = report.from_version.as_deref().unwrap_or("-");
    let verb = if report.dry_run { "would write" } else { "wrote" };
    output.header(&format!("{} {from} -> {}", report.module, report.to_version))?;
    for file in &report.planned {
        output.kv(verb, &format!("{} ({})", file.file, file.status_before.as_str()))?;
    }
    for file in &report.skipped {
        output.kv("skipped", &format!("{} ({})", file.file, file.status.as_str()))?;
    }
    if report.planned.is_empty() {
        output.info("nothing to upgrade")?;
    }
    Ok(())
}
