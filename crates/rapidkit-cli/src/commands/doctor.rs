//! `rapidkit doctor check`: tool probes and project health.

use serde::Serialize;

use rapidkit_core::domain::{Engine, SnippetStatus};

use crate::cli::DoctorCommands;
use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::OutputManager;

const DOCTOR_SCHEMA: &str = "doctor-check-v1";

#[derive(Debug, Serialize)]
struct PluginCheck {
    name: String,
    display_name: String,
    problems: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ProjectCheck {
    root: String,
    kit: String,
    variant: String,
    engine: Engine,
    installed_modules: usize,
    tracked_files: usize,
    pending_snippets: usize,
    conflicted_snippets: usize,
    problems: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    schema_version: &'static str,
    plugins: Vec<PluginCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<ProjectCheck>,
}

pub fn execute(cmd: DoctorCommands, ctx: &AppContext, output: &OutputManager) -> CliResult<()> {
    let DoctorCommands::Check { workspace, json } = cmd;
    let generator = ctx.generator();
    let runner = generator.ports().commands.as_ref();

    let spinner = output.spinner("Probing tools");
    let plugins: Vec<PluginCheck> = generator
        .plugins()
        .names()
        .into_iter()
        .filter_map(|name| generator.plugins().get(&name).ok())
        .map(|plugin| PluginCheck {
            name: plugin.name().to_string(),
            display_name: plugin.display_name().to_string(),
            problems: plugin.validate_requirements(runner),
        })
        .collect();
    spinner.finish_and_clear();

    let project = if workspace {
        let state = ctx.open_project()?;
        let mut problems = Vec::new();
        if let Some(check) = plugins.iter().find(|p| p.name == state.metadata.variant) {
            problems.extend(check.problems.iter().cloned());
        } else {
            problems.push(format!(
                "variant '{}' has no registered plugin",
                state.metadata.variant
            ));
        }
        let conflicted = state.snippets.count(SnippetStatus::Conflicted);
        if conflicted > 0 {
            problems.push(format!("{conflicted} snippets are conflicted"));
        }
        Some(ProjectCheck {
            root: state.layout.root().display().to_string(),
            kit: state.metadata.kit.clone(),
            variant: state.metadata.variant.clone(),
            engine: state.metadata.engine,
            installed_modules: state.ledger.installed_modules.len(),
            tracked_files: state.hashes.len(),
            pending_snippets: state.snippets.count(SnippetStatus::Pending),
            conflicted_snippets: conflicted,
            problems,
        })
    } else {
        None
    };

    let report = DoctorReport {
        schema_version: DOCTOR_SCHEMA,
        plugins,
        project,
    };

    if output.wants_json(json) {
        output.json(&report)?;
    } else {
        output.header("Frameworks")?;
        for plugin in &report.plugins {
            if plugin.problems.is_empty() {
                output.success(&plugin.display_name)?;
            }
            for problem in &plugin.problems {
                output.warning(&format!("{}: {problem}", plugin.display_name))?;
            }
        }
        if let Some(project) = &report.project {
            output.header(&format!("Project {}", project.root))?;
            output.kv("kit", &format!("{} ({}, {})", project.kit, project.variant, project.engine))?;
            output.kv("modules", &project.installed_modules.to_string())?;
            output.kv("tracked files", &project.tracked_files.to_string())?;
            output.kv("pending snippets", &project.pending_snippets.to_string())?;
            for problem in &project.problems {
                output.error(problem)?;
            }
        }
    }

    // Tool problems on their own are informational; a project that cannot
    // be worked on is a failed check.
    match &report.project {
        Some(project) if !project.problems.is_empty() => Err(CliError::ValidationFailed {
            message: format!("{} project problems found", project.problems.len()),
        }),
        _ => Ok(()),
    }
}
