//! On-disk module catalog and kit source.

mod kits;
mod modules;

pub use kits::FsKitSource;
pub use modules::{FsModuleCatalog, MANIFEST_FILE};

use std::path::{Path, PathBuf};

use rapidkit_core::application::ApplicationError;

/// `path` relative to `root` with `/` separators.
pub(crate) fn relative_slash(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

pub(crate) fn read_optional(path: &Path) -> Result<Option<String>, ApplicationError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ApplicationError::filesystem(path, e)),
    }
}

pub(crate) fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name == "__pycache__" || name == "node_modules"
}

pub(crate) fn join_slash(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|p| !p.is_empty())
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}
