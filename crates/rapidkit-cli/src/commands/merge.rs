//! `rapidkit merge module`.

use rapidkit_core::application::ports::{MergePrompt, NonInteractivePrompt};
use rapidkit_core::application::reports::{MergeDecision, MergeStrategy};

use crate::cli::MergeCommands;
use crate::context::AppContext;
use crate::error::CliResult;
use crate::output::OutputManager;
use crate::prompt::merge_prompt;

pub fn execute(cmd: MergeCommands, ctx: &AppContext, output: &OutputManager) -> CliResult<()> {
    let MergeCommands::Module {
        slug,
        strategy,
        auto_apply_template_updated,
        dry_run,
        json,
    } = cmd;
    let strategy = MergeStrategy::from(strategy);
    let prompt: Box<dyn MergePrompt> = if strategy == MergeStrategy::Prompt && !dry_run {
        merge_prompt()
    } else {
        Box::new(NonInteractivePrompt)
    };

    let mut state = ctx.open_project()?;
    let report = ctx.diff().merge_module(
        &mut state,
        &slug,
        strategy,
        auto_apply_template_updated,
        dry_run,
        prompt.as_ref(),
    )?;

    if output.wants_json(json) {
        return output.json(&report);
    }

    output.header(&report.module)?;
    for action in &report.actions {
        let decision = match action.decision {
            MergeDecision::ApplyTemplate => "template",
            MergeDecision::KeepLocal => "local",
            MergeDecision::Skip => "skipped",
            MergeDecision::Noop => "unchanged",
        };
        output.kv(decision, &format!("{} ({})", action.file, action.status_before.as_str()))?;
    }
    if report.actions.is_empty() {
        output.success("nothing to merge")?;
    }
    if report.aborted {
        output.warning("merge stopped early; earlier decisions were kept")?;
    }
    if report.dry_run {
        output.info("dry run: no files written")?;
    }
    Ok(())
}
