//! Loaded project state.
//!
//! One operation loads the registries once, mutates them in memory and
//! writes them back at its commit points. Nothing here is cached between
//! operations.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::ApplicationError;
use crate::application::layout::{ProjectLayout, load_json, load_json_or_default, save_json};
use crate::application::ports::Filesystem;
use crate::domain::{
    ArtifactKind, HashRegistry, InstalledLedger, ProjectContext, ProjectMetadata, SnippetRegistry,
    SnippetStatus, StagedChanges,
};
use crate::error::RapidkitResult;

/// One snippet state transition, appended to the audit log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub key: String,
    pub snippet_id: String,
    pub file: String,
    pub producer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<SnippetStatus>,
    pub to: SnippetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Files touched by one commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub written: Vec<String>,
    pub unchanged: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProjectState {
    pub layout: ProjectLayout,
    pub metadata: ProjectMetadata,
    pub context: ProjectContext,
    pub hashes: HashRegistry,
    pub snippets: SnippetRegistry,
    pub ledger: InstalledLedger,
    audit: Vec<AuditEvent>,
}

impl ProjectState {
    /// Fresh state for a project being created.
    pub fn new(layout: ProjectLayout, metadata: ProjectMetadata, context: ProjectContext) -> Self {
        Self {
            layout,
            metadata,
            context,
            hashes: HashRegistry::new(),
            snippets: SnippetRegistry::new(),
            ledger: InstalledLedger::default(),
            audit: Vec::new(),
        }
    }

    pub fn load(fs: &dyn Filesystem, layout: ProjectLayout) -> RapidkitResult<Self> {
        let metadata: ProjectMetadata = load_json(fs, &layout.project_json())?.ok_or_else(|| {
            ApplicationError::ProjectNotInitialized {
                path: layout.root().to_path_buf(),
            }
        })?;
        let context = load_json_or_default(fs, &layout.context_json())?;
        let hashes = load_json_or_default(fs, &layout.hashes_json())?;
        let snippets = load_json_or_default(fs, &layout.snippet_registry())?;
        let ledger = load_json_or_default(fs, &layout.ledger())?;
        debug!(root = %layout.root().display(), "Loaded project state");
        Ok(Self {
            layout,
            metadata,
            context,
            hashes,
            snippets,
            ledger,
            audit: Vec::new(),
        })
    }

    pub fn record_audit(&mut self, event: AuditEvent) {
        self.audit.push(event);
    }

    pub fn pending_audit(&self) -> &[AuditEvent] {
        &self.audit
    }

    /// Write every store and flush queued audit events.
    pub fn save(&mut self, fs: &dyn Filesystem) -> RapidkitResult<()> {
        save_json(fs, &self.layout.project_json(), &self.metadata)?;
        save_json(fs, &self.layout.context_json(), &self.context)?;
        save_json(fs, &self.layout.hashes_json(), &self.hashes)?;
        save_json(fs, &self.layout.snippet_registry(), &self.snippets)?;
        save_json(fs, &self.layout.ledger(), &self.ledger)?;

        if !self.audit.is_empty() {
            let mut lines = String::new();
            for event in &self.audit {
                let line = serde_json::to_string(event)
                    .map_err(|e| ApplicationError::serialization("snippet audit log", e))?;
                lines.push_str(&line);
                lines.push('\n');
            }
            fs.append_file(&self.layout.audit_log(), &lines)?;
            self.audit.clear();
        }
        Ok(())
    }

    /// Flush staged files, record their hashes and save the registries.
    ///
    /// Module artifacts are recorded under `owner` (slug, version). Snippet
    /// and dependency edits only refresh the hash of files that are
    /// already tracked, keeping their owner.
    pub fn commit(
        &mut self,
        fs: &dyn Filesystem,
        staged: &StagedChanges,
        owner: Option<(&str, &str)>,
    ) -> RapidkitResult<CommitSummary> {
        let root = self.layout.root().to_path_buf();
        let mut summary = CommitSummary::default();

        for dir in staged.directories() {
            fs.create_dir_all(&root.join(dir))?;
        }

        for file in staged.files() {
            let target = file.path.to_fs(&root);
            if fs.read_file(&target)?.as_deref() == Some(file.content.as_str()) {
                summary.unchanged.push(file.path.to_string());
            } else {
                fs.write_file(&target, &file.content)?;
                summary.written.push(file.path.to_string());
            }

            let record_as = match (file.kind, owner) {
                (ArtifactKind::Snippet | ArtifactKind::Dependency, _) | (_, None) => self
                    .hashes
                    .get(&file.path)
                    .map(|r| (r.module.clone(), r.module_version.clone())),
                (_, Some((slug, version))) => Some((slug.to_string(), version.to_string())),
            };
            if let Some((module, version)) = record_as {
                self.hashes.record_file_hash(
                    &file.path,
                    &module,
                    &version,
                    file.content.as_bytes(),
                    false,
                );
            }
        }

        self.save(fs)?;
        info!(
            written = summary.written.len(),
            unchanged = summary.unchanged.len(),
            "Committed staged changes"
        );
        Ok(summary)
    }
}
