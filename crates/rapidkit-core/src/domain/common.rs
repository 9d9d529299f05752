use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::error::DomainError;

/// A project-relative path in POSIX form.
///
/// This type encodes the invariant every registry key relies on:
/// generated artifacts are addressed relative to the project root, with
/// forward slashes, and never escape it.
///
/// `ProjectPath` is a *semantic guardrail*, not a filesystem abstraction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectPath(String);

impl ProjectPath {
    /// Try to create a project path.
    ///
    /// Backslashes are normalised, `.` segments dropped. Absolute paths and
    /// `..` segments are rejected.
    pub fn try_new(path: impl AsRef<str>) -> Result<Self, DomainError> {
        let raw = path.as_ref().replace('\\', "/");
        if raw.starts_with('/') || Path::new(&raw).is_absolute() {
            return Err(DomainError::InvalidPath {
                path: raw,
                reason: "absolute paths are not allowed".into(),
            });
        }

        let mut parts = Vec::new();
        for part in raw.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    return Err(DomainError::InvalidPath {
                        path: raw.clone(),
                        reason: "'..' segments are not allowed".into(),
                    });
                }
                other => parts.push(other),
            }
        }

        if parts.is_empty() {
            return Err(DomainError::InvalidPath {
                path: raw,
                reason: "path is empty".into(),
            });
        }

        Ok(Self(parts.join("/")))
    }

    /// Build from a filesystem path below `root`.
    pub fn from_fs(root: &Path, path: &Path) -> Result<Self, DomainError> {
        let rel = path.strip_prefix(root).map_err(|_| DomainError::InvalidPath {
            path: path.display().to_string(),
            reason: format!("not inside {}", root.display()),
        })?;
        let joined = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        Self::try_new(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve against a root directory.
    pub fn to_fs(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |acc, seg| acc.join(seg))
    }

    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn join(&self, segment: &str) -> Result<Self, DomainError> {
        Self::try_new(format!("{}/{}", self.0, segment))
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        self.0 == prefix || self.0.starts_with(&format!("{prefix}/"))
    }
}

impl TryFrom<String> for ProjectPath {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<ProjectPath> for String {
    fn from(p: ProjectPath) -> Self {
        p.0
    }
}

impl AsRef<str> for ProjectPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 of the exact bytes, lowercase hex.
pub fn content_hash(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    hex::encode(hasher.finalize())
}

/// Validate a catalog slug such as `free/database/db_postgres`.
pub fn validate_slug(slug: &str) -> Result<(), DomainError> {
    let invalid = |reason: &str| DomainError::InvalidSlug {
        slug: slug.to_string(),
        reason: reason.to_string(),
    };

    if slug.is_empty() {
        return Err(invalid("slug is empty"));
    }
    if slug.starts_with('/') || slug.ends_with('/') {
        return Err(invalid("slug cannot start or end with '/'"));
    }
    for segment in slug.split('/') {
        if segment.is_empty() {
            return Err(invalid("empty path segment"));
        }
        if segment == "." || segment == ".." {
            return Err(invalid("relative segments are not allowed"));
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(invalid(
                "only lowercase letters, digits, '_' and '-' are allowed",
            ));
        }
    }
    Ok(())
}

/// Final segment of a slug (`free/database/db_postgres` → `db_postgres`).
pub fn slug_basename(slug: &str) -> &str {
    slug.rsplit('/').next().unwrap_or(slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------------
    // ProjectPath
    // ---------------------------------------------------------------------

    #[test]
    fn project_path_normalises_separators() {
        let p = ProjectPath::try_new(r"src\core\.\config.py").unwrap();
        assert_eq!(p.as_str(), "src/core/config.py");
        assert_eq!(p.file_name(), "config.py");
    }

    #[test]
    fn project_path_rejects_absolute() {
        assert!(ProjectPath::try_new("/etc/passwd").is_err());
    }

    #[test]
    fn project_path_rejects_parent_segments() {
        assert!(ProjectPath::try_new("src/../../etc").is_err());
    }

    #[test]
    fn project_path_from_fs() {
        let root = Path::new("/tmp/project");
        let p = ProjectPath::from_fs(root, &root.join("src").join("main.py")).unwrap();
        assert_eq!(p.as_str(), "src/main.py");
        assert_eq!(p.to_fs(root), root.join("src").join("main.py"));
    }

    #[test]
    fn starts_with_respects_segments() {
        let p = ProjectPath::try_new("src/core/health/x.py").unwrap();
        assert!(p.starts_with("src/core/health"));
        assert!(!p.starts_with("src/core/heal"));
    }

    // ---------------------------------------------------------------------
    // Hashing and slugs
    // ---------------------------------------------------------------------

    #[test]
    fn content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn slug_validation() {
        assert!(validate_slug("free/database/db_postgres").is_ok());
        assert!(validate_slug("Free/db").is_err());
        assert!(validate_slug("free//db").is_err());
        assert!(validate_slug("free/../db").is_err());
        assert_eq!(slug_basename("free/essentials/settings"), "settings");
    }
}
