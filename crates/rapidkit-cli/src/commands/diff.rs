//! `rapidkit diff module|all`.

use rapidkit_core::application::reports::{ModuleDiff, ReportedStatus};

use crate::cli::DiffCommands;
use crate::context::AppContext;
use crate::error::CliResult;
use crate::output::OutputManager;

pub fn execute(cmd: DiffCommands, ctx: &AppContext, output: &OutputManager) -> CliResult<()> {
    let state = ctx.open_project()?;
    let diff = ctx.diff();
    match cmd {
        DiffCommands::Module {
            slug,
            json,
            merge_json,
        } => {
            if merge_json {
                return output.json(&diff.merge_payload(&state, &slug)?);
            }
            let report = diff.diff_module(&state, &slug)?;
            if output.wants_json(json) {
                return output.json(&report);
            }
            print_module_diff(output, &report, true)
        }
        DiffCommands::All(flag) => {
            let report = diff.diff_all(&state)?;
            if output.wants_json(flag.json) {
                return output.json(&report);
            }
            if report.modules.is_empty() {
                return output.info("No modules installed").map_err(Into::into);
            }
            for module in &report.modules {
                print_module_diff(output, module, false)?;
            }
            Ok(())
        }
    }
}

pub(crate) fn print_module_diff(
    output: &OutputManager,
    report: &ModuleDiff,
    show_clean: bool,
) -> CliResult<()> {
    let installed = report.installed_version.as_deref().unwrap_or("-");
    output.header(&format!(
        "{} (installed {installed}, catalog {})",
        report.module, report.catalog_version
    ))?;
    let mut shown = 0;
    for file in &report.files {
        if file.status == ReportedStatus::Clean && !show_clean {
            continue;
        }
        output.kv(file.status.as_str(), &file.file)?;
        shown += 1;
    }
    if shown == 0 {
        output.success("all files clean")?;
    }
    Ok(())
}
