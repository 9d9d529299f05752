//! On-disk layout of a generated project and JSON store helpers.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::application::ApplicationError;
use crate::application::ports::Filesystem;
use crate::error::RapidkitResult;

pub const STATE_DIR: &str = ".rapidkit";

/// Paths of every store inside a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn project_json(&self) -> PathBuf {
        self.state_dir().join("project.json")
    }

    pub fn context_json(&self) -> PathBuf {
        self.state_dir().join("context.json")
    }

    pub fn hashes_json(&self) -> PathBuf {
        self.state_dir().join("hashes.json")
    }

    pub fn snippet_registry(&self) -> PathBuf {
        self.state_dir().join("snippet_registry.json")
    }

    pub fn audit_log(&self) -> PathBuf {
        self.state_dir().join("audit").join("snippet_injections.jsonl")
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.state_dir().join("snapshots")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.state_dir().join("modules.lock.yaml")
    }

    /// `registry.json` at the project root.
    pub fn ledger(&self) -> PathBuf {
        self.root.join("registry.json")
    }

    pub fn pyproject(&self) -> PathBuf {
        self.root.join("pyproject.toml")
    }

    pub fn package_json(&self) -> PathBuf {
        self.root.join("package.json")
    }

    pub fn is_initialized(&self, fs: &dyn Filesystem) -> bool {
        fs.exists(&self.project_json())
    }

    pub fn require_initialized(&self, fs: &dyn Filesystem) -> RapidkitResult<()> {
        if self.is_initialized(fs) {
            Ok(())
        } else {
            Err(ApplicationError::ProjectNotInitialized {
                path: self.root.clone(),
            }
            .into())
        }
    }
}

fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read a JSON document, falling back to `T::default()` when absent.
pub fn load_json_or_default<T>(fs: &dyn Filesystem, path: &Path) -> RapidkitResult<T>
where
    T: DeserializeOwned + Default,
{
    match fs.read_file(path)? {
        Some(text) if !text.trim().is_empty() => serde_json::from_str(&text)
            .map_err(|e| ApplicationError::serialization(document_name(path), e).into()),
        _ => Ok(T::default()),
    }
}

/// Read a JSON document that must exist.
pub fn load_json<T: DeserializeOwned>(fs: &dyn Filesystem, path: &Path) -> RapidkitResult<Option<T>> {
    match fs.read_file(path)? {
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ApplicationError::serialization(document_name(path), e).into()),
        None => Ok(None),
    }
}

/// Pretty JSON with a trailing newline, written atomically.
pub fn save_json<T: Serialize>(fs: &dyn Filesystem, path: &Path, value: &T) -> RapidkitResult<()> {
    let mut text = serde_json::to_string_pretty(value)
        .map_err(|e| ApplicationError::serialization(document_name(path), e))?;
    text.push('\n');
    fs.write_file(path, &text)
}
