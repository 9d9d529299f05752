//! `rapidkit add module`.

use super::{print_module, vars_context};
use crate::cli::AddCommands;
use crate::context::AppContext;
use crate::error::CliResult;
use crate::output::OutputManager;

pub fn execute(cmd: AddCommands, ctx: &AppContext, output: &OutputManager) -> CliResult<()> {
    let AddCommands::Module {
        slug,
        checks,
        vars,
        output: json,
    } = cmd;
    let mut state = ctx.open_project()?;
    let vars = vars_context(vars.vars);

    let projects = ctx.projects()?.skip_checks(checks.skip_verify);
    let spinner = output.spinner(&format!("Installing {slug}"));
    let result = projects.add_module(&mut state, &slug, &vars);
    spinner.finish_and_clear();
    let outcome = result?;

    if output.wants_json(json.json) {
        return output.json(&outcome);
    }
    if !outcome.plan.already_installed.is_empty() {
        output.info(&format!(
            "Already installed: {}",
            outcome.plan.already_installed.join(", ")
        ))?;
    }
    for module in &outcome.modules {
        print_module(output, module)?;
    }
    Ok(())
}
