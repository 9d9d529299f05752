//! `rapidkit init`: virtualenv / node_modules for an existing project.

use rapidkit_core::application::services::project_service::StepStatus;

use crate::cli::JsonFlag;
use crate::context::AppContext;
use crate::error::CliResult;
use crate::output::OutputManager;

pub fn execute(args: JsonFlag, ctx: &AppContext, output: &OutputManager) -> CliResult<()> {
    let state = ctx.open_project()?;
    let projects = ctx.projects()?;
    let spinner = output.spinner("Installing project runtime");
    let outcome = projects.init(&state);
    spinner.finish_and_clear();

    if output.wants_json(args.json) {
        return output.json(&outcome);
    }

    output.header(&format!("Runtime ({})", outcome.engine))?;
    for step in &outcome.steps {
        match step.status {
            StepStatus::Ok => output.success(&step.command)?,
            StepStatus::Failed => output.error(&format!("{} failed", step.command))?,
            StepStatus::TimedOut => output.warning(&format!("{} timed out", step.command))?,
            StepStatus::NotFound => output.warning(&format!("{} not found", step.command))?,
        }
    }
    for warning in &outcome.warnings {
        output.warning(warning)?;
    }
    Ok(())
}
