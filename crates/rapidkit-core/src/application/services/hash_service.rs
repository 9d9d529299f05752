//! File hash store and snapshots.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::application::ApplicationError;
use crate::application::layout::{ProjectLayout, load_json, load_json_or_default, save_json};
use crate::application::ports::{Clock, Filesystem};
use crate::application::reports::{SNAPSHOT_GC_SCHEMA, SnapshotGcReport};
use crate::domain::{FileStatus, HashRegistry, ProjectPath, classify, content_hash};
use crate::error::RapidkitResult;

pub fn load_hashes(fs: &dyn Filesystem, layout: &ProjectLayout) -> RapidkitResult<HashRegistry> {
    load_json_or_default(fs, &layout.hashes_json())
}

pub fn save_hashes(
    fs: &dyn Filesystem,
    layout: &ProjectLayout,
    registry: &HashRegistry,
) -> RapidkitResult<()> {
    save_json(fs, &layout.hashes_json(), registry)
}

/// Three hashes of one file plus its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    pub path: ProjectPath,
    pub on_disk: Option<String>,
    pub current_hash: Option<String>,
    pub recorded_hash: Option<String>,
    pub rendered_hash: String,
    pub status: Option<FileStatus>,
}

/// Classify `path` against a fresh render. `None` status means the file is
/// new: neither tracked nor on disk.
pub fn file_state(
    fs: &dyn Filesystem,
    root: &Path,
    registry: &HashRegistry,
    path: &ProjectPath,
    rendered: &str,
) -> RapidkitResult<FileState> {
    let on_disk = fs.read_file(&path.to_fs(root))?;
    let current_hash = on_disk.as_deref().map(content_hash);
    let recorded_hash = registry.get(path).map(|r| r.hash.clone());
    let rendered_hash = content_hash(rendered);
    let status = classify(
        current_hash.as_deref(),
        recorded_hash.as_deref(),
        &rendered_hash,
    );
    Ok(FileState {
        path: path.clone(),
        on_disk,
        current_hash,
        recorded_hash,
        rendered_hash,
        status,
    })
}

// ============================================================================
// Snapshots
// ============================================================================

/// `manifest.json` inside a snapshot directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub files: Vec<String>,
    /// Project stores copied next to the files.
    #[serde(default)]
    pub stores: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreOutcome {
    pub id: String,
    pub restored: Vec<String>,
    pub missing: Vec<String>,
}

const FILES_DIR: &str = "files";
const STORES_DIR: &str = "stores";
const MANIFEST: &str = "manifest.json";

fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Checkpoints under `.rapidkit/snapshots/`.
pub struct SnapshotManager {
    fs: Arc<dyn Filesystem>,
    clock: Arc<dyn Clock>,
    layout: ProjectLayout,
}

impl SnapshotManager {
    pub fn new(fs: Arc<dyn Filesystem>, clock: Arc<dyn Clock>, layout: ProjectLayout) -> Self {
        Self { fs, clock, layout }
    }

    fn project_stores(&self) -> Vec<(String, PathBuf)> {
        vec![
            ("snippet_registry.json".into(), self.layout.snippet_registry()),
            ("registry.json".into(), self.layout.ledger()),
            ("project.json".into(), self.layout.project_json()),
        ]
    }

    fn next_id(&self, label: Option<&str>) -> String {
        let stamp = self.clock.now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
        let base = match label.map(sanitize_label).filter(|l| !l.is_empty()) {
            Some(label) => format!("{stamp}-{label}"),
            None => stamp,
        };
        let dir = self.layout.snapshots_dir();
        let mut id = base.clone();
        let mut n = 1;
        while self.fs.exists(&dir.join(&id)) {
            id = format!("{base}-{n}");
            n += 1;
        }
        id
    }

    /// Copy every tracked file, the hash registry and the project stores
    /// into a new snapshot. Tracked files get their `snapshot_hash` pinned.
    #[instrument(skip(self), fields(root = %self.layout.root().display()))]
    pub fn create(&self, label: Option<&str>) -> RapidkitResult<SnapshotManifest> {
        self.layout.require_initialized(self.fs.as_ref())?;
        let mut registry = load_hashes(self.fs.as_ref(), &self.layout)?;
        let id = self.next_id(label);
        let dir = self.layout.snapshots_dir().join(&id);
        let root = self.layout.root();

        let tracked: Vec<ProjectPath> = registry.iter().map(|(p, _)| p.clone()).collect();
        let mut files = Vec::new();
        for path in tracked {
            let Some(content) = self.fs.read_file(&path.to_fs(root))? else {
                debug!(file = %path, "Tracked file missing; not snapshotted");
                continue;
            };
            self.fs
                .write_file(&path.to_fs(&dir.join(FILES_DIR)), &content)?;
            registry.set_snapshot_hash(&path, content_hash(&content));
            files.push(path.to_string());
        }

        let mut stores = Vec::new();
        for (name, source) in self.project_stores() {
            if let Some(content) = self.fs.read_file(&source)? {
                self.fs.write_file(&dir.join(STORES_DIR).join(&name), &content)?;
                stores.push(name);
            }
        }

        save_json(self.fs.as_ref(), &dir.join("hashes.json"), &registry)?;
        let manifest = SnapshotManifest {
            id: id.clone(),
            created_at: self.clock.now(),
            label: label.map(str::to_string),
            files,
            stores,
        };
        save_json(self.fs.as_ref(), &dir.join(MANIFEST), &manifest)?;
        save_hashes(self.fs.as_ref(), &self.layout, &registry)?;

        info!(snapshot = %id, files = manifest.files.len(), "Created snapshot");
        Ok(manifest)
    }

    /// Snapshots with a readable manifest, oldest first.
    pub fn list(&self) -> RapidkitResult<Vec<SnapshotManifest>> {
        let mut out = Vec::new();
        for entry in self.fs.list_dir(&self.layout.snapshots_dir())? {
            if !self.fs.is_dir(&entry) {
                continue;
            }
            match load_json::<SnapshotManifest>(self.fs.as_ref(), &entry.join(MANIFEST)) {
                Ok(Some(manifest)) => out.push(manifest),
                Ok(None) => debug!(entry = %entry.display(), "No snapshot manifest"),
                Err(e) => warn!(entry = %entry.display(), error = %e, "Unreadable snapshot manifest"),
            }
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    /// Keep the `keep` most recent entries (by name) and delete the rest.
    ///
    /// Every entry under the snapshots directory counts, file or directory.
    /// Deletion failures are collected in the report, not raised.
    #[instrument(skip(self))]
    pub fn gc(&self, keep: usize, dry_run: bool) -> RapidkitResult<SnapshotGcReport> {
        let mut entries = self.fs.list_dir(&self.layout.snapshots_dir())?;
        entries.sort_by_key(|p| entry_name(p));

        let split = entries.len().saturating_sub(keep);
        let (doomed, kept) = entries.split_at(split);

        let mut errors = Vec::new();
        let mut deleted_entries = Vec::new();
        for entry in doomed {
            let name = entry_name(entry);
            if !dry_run {
                let result = if self.fs.is_dir(entry) {
                    self.fs.remove_dir_all(entry)
                } else {
                    self.fs.remove_file(entry)
                };
                if let Err(e) = result {
                    warn!(entry = %name, error = %e, "Snapshot GC could not delete entry");
                    errors.push(format!("{name}: {e}"));
                    continue;
                }
            }
            deleted_entries.push(name);
        }

        info!(kept = kept.len(), deleted = deleted_entries.len(), dry_run, "Snapshot GC");
        Ok(SnapshotGcReport {
            schema_version: SNAPSHOT_GC_SCHEMA,
            dry_run,
            keep_limit: keep,
            kept: kept.len(),
            deleted: deleted_entries.len(),
            kept_entries: kept.iter().map(|p| entry_name(p)).collect(),
            deleted_entries,
            errors,
        })
    }

    /// Put the files and stores of a snapshot back. Without `id` the most
    /// recent snapshot is used.
    #[instrument(skip(self))]
    pub fn restore(&self, id: Option<&str>) -> RapidkitResult<RestoreOutcome> {
        let snapshots = self.list()?;
        let manifest = match id {
            Some(id) => snapshots.into_iter().find(|s| s.id == id),
            None => snapshots.into_iter().last(),
        }
        .ok_or_else(|| ApplicationError::SnapshotNotFound {
            id: id.unwrap_or("latest").to_string(),
        })?;

        let dir = self.layout.snapshots_dir().join(&manifest.id);
        let root = self.layout.root();
        let mut restored = Vec::new();
        let mut missing = Vec::new();

        for file in &manifest.files {
            let path = ProjectPath::try_new(file)?;
            match self.fs.read_file(&path.to_fs(&dir.join(FILES_DIR)))? {
                Some(content) => {
                    self.fs.write_file(&path.to_fs(root), &content)?;
                    restored.push(file.clone());
                }
                None => missing.push(file.clone()),
            }
        }

        for (name, target) in self.project_stores() {
            if !manifest.stores.contains(&name) {
                continue;
            }
            if let Some(content) = self.fs.read_file(&dir.join(STORES_DIR).join(&name))? {
                self.fs.write_file(&target, &content)?;
            }
        }

        let registry: HashRegistry = load_json_or_default(self.fs.as_ref(), &dir.join("hashes.json"))?;
        save_hashes(self.fs.as_ref(), &self.layout, &registry)?;

        if !missing.is_empty() {
            warn!(snapshot = %manifest.id, missing = missing.len(), "Snapshot is incomplete");
        }
        info!(snapshot = %manifest.id, restored = restored.len(), "Restored snapshot");
        Ok(RestoreOutcome {
            id: manifest.id,
            restored,
            missing,
        })
    }
}
