//! Snippet injection and reconciliation.
//!
//! Injection always works on a [`StagedChanges`]: the generator passes the
//! files of the module being committed, reconciliation starts from an
//! empty set. Content is taken from the staged copy when there is one and
//! from disk otherwise. Registry updates and audit events go into the
//! [`ProjectState`] and land on disk with the next commit.

use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::application::ApplicationError;
use crate::application::ports::Ports;
use crate::application::reports::ReconcileStats;
use crate::application::state::{AuditEvent, ProjectState};
use crate::domain::snippet::{BlockState, find_anchor, find_block, inject_ordered, order_key};
use crate::domain::{
    ArtifactKind, ConflictResolution, ContextValue, InjectionFailure, ProjectPath,
    RenderContext, SnippetDefinition, SnippetRecord, SnippetRegistry, SnippetStatus,
    StagedChanges,
};
use crate::error::RapidkitResult;

/// One snippet to place.
#[derive(Debug, Clone)]
pub struct InjectionRequest {
    /// Module emitting the snippet.
    pub producer: String,
    pub definition: SnippetDefinition,
    pub target: ProjectPath,
    /// Fully merged render context.
    pub context: RenderContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionResult {
    pub key: String,
    pub status: SnippetStatus,
    pub injected: bool,
    pub blocked: bool,
    pub message: Option<String>,
}

pub struct SnippetEngine {
    ports: Ports,
}

fn snippet_id_from_key(key: &str) -> &str {
    key.split_once("::").map_or(key, |(id, _)| id)
}

fn record_key<'a>(key: &'a str, record: &'a SnippetRecord) -> (Reverse<i32>, &'a str, &'a str) {
    order_key(record.priority, &record.module_slug, snippet_id_from_key(key))
}

fn record_order(a: (&String, &SnippetRecord), b: (&String, &SnippetRecord)) -> Ordering {
    record_key(a.0, a.1).cmp(&record_key(b.0, b.1))
}

/// Whether a block ranked `new` belongs above the block `existing_id`
/// already in `file`. Blocks the registry does not know stay on top.
fn ranks_before(
    snippets: &SnippetRegistry,
    file: &str,
    new: (Reverse<i32>, &str, &str),
    existing_id: &str,
) -> bool {
    snippets
        .get(&SnippetRegistry::key(existing_id, file))
        .is_some_and(|r| new < order_key(r.priority, &r.module_slug, existing_id))
}

impl SnippetEngine {
    pub fn new(ports: Ports) -> Self {
        Self { ports }
    }

    fn current_content(
        &self,
        state: &ProjectState,
        staged: &StagedChanges,
        target: &ProjectPath,
    ) -> RapidkitResult<Option<String>> {
        if let Some(file) = staged.get(target) {
            return Ok(Some(file.content.clone()));
        }
        self.ports.fs.read_file(&target.to_fs(state.layout.root()))
    }

    fn render_body(
        &self,
        producer: &str,
        template: &str,
        target: &ProjectPath,
        context: &RenderContext,
    ) -> RapidkitResult<String> {
        let source = self.ports.modules.read_template(producer, template)?;
        self.ports.renderer.render(target.as_str(), &source, context)
    }

    fn transition(
        &self,
        state: &mut ProjectState,
        key: &str,
        record: SnippetRecord,
    ) {
        let previous = state.snippets.get(key).map(|r| r.status);
        if previous != Some(record.status) {
            state.record_audit(AuditEvent {
                event_id: Uuid::new_v4(),
                timestamp: record.updated_at,
                key: key.to_string(),
                snippet_id: snippet_id_from_key(key).to_string(),
                file: record.file.clone(),
                producer: record.module_slug.clone(),
                from: previous,
                to: record.status,
                message: record.message.clone(),
            });
        }
        state.snippets.upsert(key.to_string(), record);
    }

    /// Place one snippet, or record why it cannot be placed yet.
    ///
    /// Missing owner module, target file or anchor leave the entry
    /// `pending` (`blocked: true`). A malformed block marks it
    /// `conflicted` and leaves the file alone.
    #[instrument(skip_all, fields(snippet = %request.definition.id, target = %request.target))]
    pub fn inject_snippet_enterprise(
        &self,
        state: &mut ProjectState,
        staged: &mut StagedChanges,
        request: &InjectionRequest,
    ) -> RapidkitResult<InjectionResult> {
        let def = &request.definition;
        let key = SnippetRegistry::key(&def.id, request.target.as_str());

        let blocked_by = match &def.owner {
            Some(owner) if owner != &request.producer && !state.ledger.contains(owner) => {
                Some(format!("owner module '{owner}' is not installed"))
            }
            _ => None,
        };

        let (status, injected, message) = match blocked_by {
            Some(reason) => (SnippetStatus::Pending, false, Some(reason)),
            None => match self.current_content(state, staged, &request.target)? {
                None => (
                    SnippetStatus::Pending,
                    false,
                    Some(format!("target file '{}' does not exist", request.target)),
                ),
                Some(content) => self.apply(&state.snippets, staged, request, &content)?,
            },
        };

        let record = SnippetRecord {
            status,
            file: request.target.to_string(),
            anchor: def.anchor.clone(),
            version: def.version.clone(),
            priority: def.priority,
            template: def.template.clone(),
            module_slug: request.producer.clone(),
            owner_module: def.owner.clone(),
            context: request.context.to_map(),
            schema: def.schema.clone(),
            conflict_resolution: def.conflict_resolution,
            updated_at: self.ports.clock.now(),
            message: message.clone(),
        };
        self.transition(state, &key, record);

        match status {
            SnippetStatus::Pending => {
                warn!(key = %key, reason = message.as_deref().unwrap_or(""), "Snippet deferred")
            }
            SnippetStatus::Conflicted => {
                warn!(key = %key, "Snippet block is malformed; file left untouched")
            }
            _ => debug!(key = %key, %status, "Snippet processed"),
        }

        Ok(InjectionResult {
            key,
            status,
            injected,
            blocked: status == SnippetStatus::Pending,
            message,
        })
    }

    fn apply(
        &self,
        snippets: &SnippetRegistry,
        staged: &mut StagedChanges,
        request: &InjectionRequest,
        content: &str,
    ) -> RapidkitResult<(SnippetStatus, bool, Option<String>)> {
        let def = &request.definition;
        if find_block(content, &def.anchor, &def.id) == BlockState::Absent
            && find_anchor(content, &def.anchor).is_none()
        {
            return Ok((
                SnippetStatus::Pending,
                false,
                Some(format!("anchor '{}' not found", def.anchor)),
            ));
        }

        let body = self.render_body(&request.producer, &def.template, &request.target, &request.context)?;
        let rank = order_key(def.priority, &request.producer, &def.id);
        let goes_before = |existing: &str| {
            ranks_before(snippets, request.target.as_str(), rank, existing)
        };
        Ok(
            match inject_ordered(
                content,
                &def.anchor,
                &def.id,
                &body,
                def.conflict_resolution,
                goes_before,
            ) {
                Ok(outcome) => {
                    let injected = match outcome.content() {
                        Some(updated) => {
                            staged.replace_content(
                                &request.target,
                                updated.to_string(),
                                ArtifactKind::Snippet,
                            );
                            true
                        }
                        None => false,
                    };
                    (SnippetStatus::Applied, injected, None)
                }
                Err(InjectionFailure::Malformed) => {
                    let conflict = ApplicationError::InjectionConflict {
                        snippet: def.id.clone(),
                        file: request.target.to_string(),
                    };
                    (SnippetStatus::Conflicted, false, Some(conflict.to_string()))
                }
                Err(InjectionFailure::AnchorMissing) => (
                    SnippetStatus::Pending,
                    false,
                    Some(format!("anchor '{}' not found", def.anchor)),
                ),
            },
        )
    }

    /// Re-apply every `applied` snippet that targets `path` onto a fresh
    /// render, so regenerated files keep their blocks in the same order
    /// injection put them in.
    pub fn overlay_applied(
        &self,
        state: &ProjectState,
        path: &ProjectPath,
        rendered: String,
    ) -> String {
        let mut records: Vec<(&String, &SnippetRecord)> = state
            .snippets
            .iter()
            .filter(|(_, r)| r.status == SnippetStatus::Applied && r.file == path.as_str())
            .collect();
        records.sort_by(|a, b| record_order(*a, *b));

        let mut content = rendered;
        for (key, record) in records {
            let context: RenderContext = record.context.clone().into_iter().collect();
            let body = match self.render_body(&record.module_slug, &record.template, path, &context) {
                Ok(body) => body,
                Err(e) => {
                    warn!(key = %key, error = %e, "Cannot re-render applied snippet");
                    continue;
                }
            };
            let resolution = match record.conflict_resolution {
                ConflictResolution::Skip => ConflictResolution::Override,
                other => other,
            };
            let rank = record_key(key, record);
            let goes_before = |existing: &str| {
                ranks_before(&state.snippets, path.as_str(), rank, existing)
            };
            if let Ok(outcome) = inject_ordered(
                &content,
                &record.anchor,
                snippet_id_from_key(key),
                &body,
                resolution,
                goes_before,
            ) && let Some(updated) = outcome.content()
            {
                content = updated.to_string();
            }
        }
        content
    }

    /// Promote pending snippets whose producer and owner are installed.
    ///
    /// With `scope`, only entries whose producer or owner is listed are
    /// considered. Running it again without changes applies nothing.
    #[instrument(skip(self, state))]
    pub fn reconcile(
        &self,
        state: &mut ProjectState,
        scope: Option<&[String]>,
    ) -> RapidkitResult<ReconcileStats> {
        let in_scope = |record: &SnippetRecord| match scope {
            None => true,
            Some(slugs) => {
                slugs.contains(&record.module_slug)
                    || record
                        .owner_module
                        .as_ref()
                        .is_some_and(|o| slugs.contains(o))
            }
        };

        let pending: Vec<(String, SnippetRecord)> = state
            .snippets
            .pending_keys()
            .into_iter()
            .filter_map(|k| {
                let record = state.snippets.get(&k)?.clone();
                in_scope(&record).then_some((k, record))
            })
            .collect();

        let mut stats = ReconcileStats {
            pending_before: pending.len(),
            ..ReconcileStats::default()
        };
        let mut staged = StagedChanges::new();

        for (key, record) in pending {
            let owner_missing = record
                .owner_module
                .as_ref()
                .is_some_and(|o| o != &record.module_slug && !state.ledger.contains(o));
            if !state.ledger.contains(&record.module_slug) || owner_missing {
                debug!(key = %key, "Producer or owner not installed; skipping");
                stats.skipped += 1;
                continue;
            }

            let target = ProjectPath::try_new(&record.file)?;
            let request = InjectionRequest {
                producer: record.module_slug.clone(),
                definition: definition_from_record(&key, &record),
                target,
                context: record.context.clone().into_iter().collect(),
            };
            match self.inject_snippet_enterprise(state, &mut staged, &request) {
                Ok(result) => match result.status {
                    SnippetStatus::Applied => stats.applied += 1,
                    SnippetStatus::Pending => {}
                    _ => stats.failed += 1,
                },
                Err(e) => {
                    warn!(key = %key, error = %e, "Snippet reconciliation failed");
                    let mut failed = record.clone();
                    failed.status = SnippetStatus::Failed;
                    failed.message = Some(e.to_string());
                    failed.updated_at = self.ports.clock.now();
                    self.transition(state, &key, failed);
                    stats.failed += 1;
                }
            }
        }

        state.commit(self.ports.fs.as_ref(), &staged, None)?;

        stats.pending_after = state
            .snippets
            .iter()
            .filter(|(_, r)| r.status == SnippetStatus::Pending && in_scope(r))
            .count();
        info!(
            pending_before = stats.pending_before,
            applied = stats.applied,
            failed = stats.failed,
            pending_after = stats.pending_after,
            skipped = stats.skipped,
            "Reconciled pending snippets"
        );
        Ok(stats)
    }
}

fn definition_from_record(key: &str, record: &SnippetRecord) -> SnippetDefinition {
    SnippetDefinition {
        id: snippet_id_from_key(key).to_string(),
        target: record.file.clone(),
        anchor: record.anchor.clone(),
        template: record.template.clone(),
        owner: record.owner_module.clone(),
        priority: record.priority,
        version: record.version.clone(),
        conflict_resolution: record.conflict_resolution,
        variants: Vec::new(),
        context: BTreeMap::<String, ContextValue>::new(),
        schema: record.schema.clone(),
    }
}
