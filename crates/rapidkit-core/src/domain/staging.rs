use std::collections::HashSet;

use serde::Serialize;

use crate::domain::common::ProjectPath;
use crate::domain::error::DomainError;
use crate::domain::status::FileStatus;

/// Origin of a staged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Vendor,
    Variant,
    Snippet,
    Dependency,
    Boilerplate,
}

/// A rendered file waiting for the module commit point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: ProjectPath,
    pub content: String,
    pub kind: ArtifactKind,
    /// Classification before the write; `None` for new files.
    pub status_before: Option<FileStatus>,
}

/// Everything one module wants to write, in emission order.
///
/// Nothing here touches the disk. The generator fills a `StagedChanges`,
/// and the commit step flushes it and the registries together.
#[derive(Debug, Clone, Default)]
pub struct StagedChanges {
    files: Vec<StagedFile>,
}

impl StagedChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a rendered file. The same path may only be rendered once per
    /// module; use [`StagedChanges::replace_content`] for follow-up edits.
    pub fn stage(&mut self, file: StagedFile) -> Result<(), DomainError> {
        if self.get(&file.path).is_some() {
            return Err(DomainError::InvalidPath {
                path: file.path.to_string(),
                reason: "rendered twice by the same module".into(),
            });
        }
        self.files.push(file);
        Ok(())
    }

    /// Overwrite the content of a staged file, or stage it if absent.
    pub fn replace_content(&mut self, path: &ProjectPath, content: String, kind: ArtifactKind) {
        match self.files.iter_mut().find(|f| &f.path == path) {
            Some(existing) => existing.content = content,
            None => self.files.push(StagedFile {
                path: path.clone(),
                content,
                kind,
                status_before: None,
            }),
        }
    }

    pub fn get(&self, path: &ProjectPath) -> Option<&StagedFile> {
        self.files.iter().find(|f| &f.path == path)
    }

    pub fn files(&self) -> impl Iterator<Item = &StagedFile> {
        self.files.iter()
    }

    pub fn of_kind(&self, kind: ArtifactKind) -> impl Iterator<Item = &StagedFile> {
        self.files.iter().filter(move |f| f.kind == kind)
    }

    /// Distinct parent directories, shallow first.
    pub fn directories(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for file in &self.files {
            let parts: Vec<&str> = file.path.as_str().split('/').collect();
            for depth in 1..parts.len() {
                let dir = parts[..depth].join("/");
                if seen.insert(dir.clone()) {
                    out.push(dir);
                }
            }
        }
        out.sort_by_key(|d| d.matches('/').count());
        out
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
