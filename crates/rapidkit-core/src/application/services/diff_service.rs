//! Diff, upgrade and merge over installed modules.
//!
//! Every operation re-renders the module with the current catalog and
//! compares the render against disk and the hash registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::application::ports::{MergeChoice, MergePrompt};
use crate::application::reports::{
    AllDiff, BatchError, BatchUpgradeReport, DIFF_ALL_SCHEMA, DIFF_MERGE_SCHEMA,
    DIFF_MODULE_SCHEMA, FileDiff, FileHashes, MERGE_MODULE_SCHEMA, MergeAction, MergeDecision,
    MergeFile, MergePayload, MergeReport, MergeSide, MergeStrategy, MergeTriple, ModuleDiff,
    PlannedFile, ReportedStatus, SkippedFile, UPGRADE_BATCH_SCHEMA, UPGRADE_MODULE_SCHEMA,
    UpgradeReport,
};
use crate::application::services::generator_service::{GeneratorService, RenderedModule};
use crate::application::services::hash_service::{FileState, file_state};
use crate::application::state::ProjectState;
use crate::domain::{ArtifactKind, FileStatus, RenderContext, StagedChanges, StagedFile};
use crate::error::RapidkitResult;

/// Statuses `upgrade module` writes when no filter is given.
pub const DEFAULT_UPGRADE_STATUSES: [ReportedStatus; 3] = [
    ReportedStatus::New,
    ReportedStatus::Clean,
    ReportedStatus::TemplateUpdated,
];

pub struct DiffService {
    generator: Arc<GeneratorService>,
}

struct ModuleStates {
    rendered: RenderedModule,
    files: Vec<(FileState, String, ArtifactKind)>,
}

impl DiffService {
    pub fn new(generator: Arc<GeneratorService>) -> Self {
        Self { generator }
    }

    fn states(&self, state: &ProjectState, slug: &str) -> RapidkitResult<ModuleStates> {
        let mut rendered = self
            .generator
            .render_module(state, slug, &RenderContext::new())?;
        let fs = self.generator.ports().fs.as_ref();
        let root = state.layout.root();
        let mut files = Vec::with_capacity(rendered.files.len());
        for file in std::mem::take(&mut rendered.files) {
            let current = file_state(fs, root, &state.hashes, &file.path, &file.content)?;
            files.push((current, file.content, file.kind));
        }
        Ok(ModuleStates { rendered, files })
    }

    /// Status of every file the module renders to.
    #[instrument(skip(self, state))]
    pub fn diff_module(&self, state: &ProjectState, slug: &str) -> RapidkitResult<ModuleDiff> {
        let states = self.states(state, slug)?;
        let mut summary: BTreeMap<ReportedStatus, usize> = BTreeMap::new();
        let files: Vec<FileDiff> = states
            .files
            .into_iter()
            .map(|(current, _, _)| {
                let status = ReportedStatus::from(current.status);
                *summary.entry(status).or_default() += 1;
                FileDiff {
                    file: current.path.to_string(),
                    status,
                    hashes: FileHashes {
                        current: current.current_hash,
                        recorded: current.recorded_hash,
                        template: current.rendered_hash,
                    },
                }
            })
            .collect();

        debug!(module = slug, ?summary, "Diffed module");
        Ok(ModuleDiff {
            schema_version: DIFF_MODULE_SCHEMA,
            module: slug.to_string(),
            installed_version: state.ledger.version_of(slug).map(str::to_string),
            catalog_version: states.rendered.manifest.version.to_string(),
            files,
            summary,
        })
    }

    /// Three-way payload for external merge tools. The base side only
    /// carries the recorded hash; base content is not kept.
    pub fn merge_payload(&self, state: &ProjectState, slug: &str) -> RapidkitResult<MergePayload> {
        let states = self.states(state, slug)?;
        let files = states
            .files
            .into_iter()
            .map(|(current, rendered, _)| MergeFile {
                file: current.path.to_string(),
                status: current.status.into(),
                merge: MergeTriple {
                    base: MergeSide {
                        hash: current.recorded_hash,
                        content: None,
                    },
                    current: MergeSide {
                        hash: current.current_hash,
                        content: current.on_disk,
                    },
                    template: MergeSide {
                        hash: Some(current.rendered_hash),
                        content: Some(rendered),
                    },
                },
            })
            .collect();
        Ok(MergePayload {
            schema_version: DIFF_MERGE_SCHEMA,
            module: slug.to_string(),
            files,
        })
    }

    /// Diff every module in the installed ledger.
    pub fn diff_all(&self, state: &ProjectState) -> RapidkitResult<AllDiff> {
        let modules = state
            .ledger
            .slugs()
            .iter()
            .map(|slug| self.diff_module(state, slug))
            .collect::<RapidkitResult<Vec<_>>>()?;
        Ok(AllDiff {
            schema_version: DIFF_ALL_SCHEMA,
            modules,
        })
    }

    /// Re-render `slug` and write the files whose status is in `only`.
    #[instrument(skip(self, state, only))]
    pub fn upgrade_module(
        &self,
        state: &mut ProjectState,
        slug: &str,
        only: Option<&[ReportedStatus]>,
        dry_run: bool,
    ) -> RapidkitResult<UpgradeReport> {
        let only = only.unwrap_or(&DEFAULT_UPGRADE_STATUSES).to_vec();
        let states = self.states(state, slug)?;
        let to_version = states.rendered.manifest.version.to_string();
        let from_version = state.ledger.version_of(slug).map(str::to_string);

        let mut staged = StagedChanges::new();
        let mut planned = Vec::new();
        let mut skipped = Vec::new();
        for (current, rendered, kind) in states.files {
            let status = ReportedStatus::from(current.status);
            if !only.contains(&status) {
                skipped.push(SkippedFile {
                    file: current.path.to_string(),
                    status,
                });
                continue;
            }
            planned.push(PlannedFile {
                file: current.path.to_string(),
                status_before: status,
                status_after: ReportedStatus::Clean,
            });
            staged.stage(StagedFile {
                path: current.path,
                content: rendered,
                kind,
                status_before: current.status,
            })?;
        }

        let applied = !dry_run;
        if applied {
            let fs = self.generator.ports().fs.as_ref();
            state
                .ledger
                .upsert(slug, &to_version, self.generator.ports().clock.now());
            state.metadata.add_module(slug);
            state.commit(fs, &staged, Some((slug, &to_version)))?;
            info!(
                module = slug,
                to_version = %to_version,
                planned = planned.len(),
                skipped = skipped.len(),
                "Upgraded module"
            );
        }

        Ok(UpgradeReport {
            schema_version: UPGRADE_MODULE_SCHEMA,
            module: slug.to_string(),
            from_version,
            to_version,
            dry_run,
            only_statuses: only,
            planned,
            skipped,
            applied,
        })
    }

    /// Upgrade several modules; one failing module does not stop the rest.
    pub fn upgrade_batch(
        &self,
        state: &mut ProjectState,
        slugs: &[String],
        only: Option<&[ReportedStatus]>,
        dry_run: bool,
    ) -> BatchUpgradeReport {
        let mut modules = Vec::new();
        let mut errors = Vec::new();
        for slug in slugs {
            match self.upgrade_module(state, slug, only, dry_run) {
                Ok(report) => modules.push(report),
                Err(e) => {
                    warn!(module = %slug, error = %e, "Upgrade failed");
                    errors.push(BatchError {
                        module: slug.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        BatchUpgradeReport {
            schema_version: UPGRADE_BATCH_SCHEMA,
            dry_run,
            modules,
            errors,
        }
    }

    /// Resolve non-clean files of `slug` with `strategy`.
    ///
    /// Decisions are applied file by file as they are made, so quitting a
    /// prompt keeps everything decided before it.
    #[instrument(skip(self, state, prompt))]
    pub fn merge_module(
        &self,
        state: &mut ProjectState,
        slug: &str,
        strategy: MergeStrategy,
        auto_apply_template_updated: bool,
        dry_run: bool,
        prompt: &dyn MergePrompt,
    ) -> RapidkitResult<MergeReport> {
        let states = self.states(state, slug)?;
        let version = states.rendered.manifest.version.to_string();
        let fs = self.generator.ports().fs.as_ref();
        let root = state.layout.root().to_path_buf();

        let mut actions = Vec::new();
        let mut aborted = false;
        for (current, rendered, _) in states.files {
            let status_before = ReportedStatus::from(current.status);
            let decision = match current.status {
                None => MergeDecision::ApplyTemplate,
                Some(FileStatus::Clean) => MergeDecision::Noop,
                Some(status) => match strategy {
                    MergeStrategy::PreferTemplate => MergeDecision::ApplyTemplate,
                    MergeStrategy::KeepLocal => MergeDecision::KeepLocal,
                    MergeStrategy::Prompt
                        if auto_apply_template_updated
                            && status == FileStatus::TemplateUpdated =>
                    {
                        MergeDecision::ApplyTemplate
                    }
                    MergeStrategy::Prompt => match prompt.choose(current.path.as_str(), status) {
                        MergeChoice::ApplyTemplate => MergeDecision::ApplyTemplate,
                        MergeChoice::KeepLocal => MergeDecision::KeepLocal,
                        MergeChoice::Skip => MergeDecision::Skip,
                        MergeChoice::Quit => {
                            aborted = true;
                            break;
                        }
                    },
                },
            };

            let will_update = decision == MergeDecision::ApplyTemplate
                && current.on_disk.as_deref() != Some(rendered.as_str());
            if decision == MergeDecision::ApplyTemplate && !dry_run {
                if will_update {
                    fs.write_file(&current.path.to_fs(&root), &rendered)?;
                }
                state
                    .hashes
                    .record_file_hash(&current.path, slug, &version, rendered.as_bytes(), false);
            }
            actions.push(MergeAction {
                file: current.path.to_string(),
                status_before,
                decision,
                will_update,
            });
        }

        if !dry_run {
            state.save(fs)?;
        }
        if aborted {
            warn!(module = slug, decided = actions.len(), "Merge aborted by user");
        }
        info!(module = slug, ?strategy, dry_run, actions = actions.len(), "Merged module");
        Ok(MergeReport {
            schema_version: MERGE_MODULE_SCHEMA,
            module: slug.to_string(),
            strategy,
            dry_run,
            actions,
            aborted,
        })
    }
}
