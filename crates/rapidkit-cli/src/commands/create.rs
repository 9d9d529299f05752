//! `rapidkit create`: new project from a kit.

use rapidkit_core::application::CreateRequest;

use super::{print_module, vars_context};
use crate::cli::CreateArgs;
use crate::context::AppContext;
use crate::error::CliResult;
use crate::output::OutputManager;

pub fn execute(args: CreateArgs, ctx: &AppContext, output: &OutputManager) -> CliResult<()> {
    let request = CreateRequest {
        kit: args.template,
        name: args.name,
        parent: ctx.project.clone(),
        force: args.force,
        install_essentials: !args.no_essentials,
        variables: vars_context(args.vars.vars),
    };

    let projects = ctx.projects()?.skip_checks(args.checks.skip_verify);
    let spinner = output.spinner(&format!("Creating {} from {}", request.name, request.kit));
    let result = projects.create(&request);
    spinner.finish_and_clear();
    let outcome = result?;

    if output.wants_json(args.output.json) {
        return output.json(&outcome);
    }

    output.success(&format!(
        "Created {} ({} / {}) at {}",
        request.name,
        outcome.kit,
        outcome.engine,
        outcome.root.display()
    ))?;
    output.kv("files", &outcome.files.len().to_string())?;
    if let Some(install) = &outcome.install {
        output.header("Modules")?;
        for module in &install.modules {
            print_module(output, module)?;
        }
    }
    output.info(&format!(
        "Next: rapidkit -p {} init",
        outcome.root.display()
    ))?;
    Ok(())
}
