// ============================================================================
// domain/error.rs - DOMAIN ERRORS
// ============================================================================

use std::fmt;

use thiserror::Error;

/// Root domain error type.
///
/// All errors are:
/// - Cloneable (reports carry them around)
/// - Categorizable (for CLI display and exit codes)
/// - Actionable (provides suggestions)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    // ========================================================================
    // Validation Errors
    // ========================================================================
    #[error("Invalid module slug '{slug}': {reason}")]
    InvalidSlug { slug: String, reason: String },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Invalid version '{value}': {reason}")]
    InvalidVersion { value: String, reason: String },

    #[error("Path '{path}' is not allowed: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Override '{key}' is invalid: {reason}")]
    InvalidOverride { key: String, reason: String },

    #[error("Snippet catalog is invalid: {0}")]
    InvalidSnippet(String),

    #[error(transparent)]
    Structure(#[from] StructureError),

    // ========================================================================
    // Graph Errors
    // ========================================================================
    #[error("Dependency cycle detected: {}", cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("Module '{module}' depends on unknown module '{dependency}'")]
    UnknownDependency { module: String, dependency: String },

    // ========================================================================
    // Document Errors
    // ========================================================================
    #[error("Cannot edit {document}: {reason}")]
    MalformedDocument { document: String, reason: String },
}

impl DomainError {
    /// Get user-actionable suggestions for fixing this error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidSlug { .. } => vec![
                "Module slugs look like 'free/database/db_postgres'".into(),
                "Use lowercase letters, digits, '_' and '-' separated by '/'".into(),
            ],
            Self::Manifest(e) => {
                let mut out = vec![format!("Fix module.yaml for '{}':", e.slug)];
                out.extend(e.issues.iter().map(|i| format!("  • {i}")));
                out
            }
            Self::DependencyCycle { cycle } => vec![
                "Modules cannot depend on each other in a loop".into(),
                format!("Break the cycle: {}", cycle.join(" -> ")),
            ],
            Self::UnknownDependency { dependency, .. } => vec![
                format!("Module '{dependency}' is not in the catalog"),
                "Try: rapidkit modules summary".into(),
            ],
            Self::Structure(e) => {
                let mut out = vec![format!("Module '{}' violates the structure blueprint", e.module)];
                out.extend(e.messages.iter().map(|m| format!("  • {m}")));
                out
            }
            Self::MalformedDocument { document, .. } => vec![
                format!("Check {document} by hand and re-run"),
            ],
            _ => vec!["See documentation for more details".into()],
        }
    }

    /// Error category for CLI display styling.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownDependency { .. } => ErrorCategory::NotFound,
            Self::MalformedDocument { .. } => ErrorCategory::Conflict,
            _ => ErrorCategory::Validation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Conflict,
    NotFound,
    Internal,
}

// ============================================================================
// Manifest errors
// ============================================================================

/// Structured manifest failure: every problem found in one `module.yaml`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Manifest for '{slug}' is invalid ({} issue(s))", issues.len())]
pub struct ManifestError {
    pub slug: String,
    pub issues: Vec<ManifestIssue>,
}

impl ManifestError {
    pub fn new(slug: impl Into<String>, issues: Vec<ManifestIssue>) -> Self {
        Self {
            slug: slug.into(),
            issues,
        }
    }

    pub fn single(slug: impl Into<String>, issue: ManifestIssue) -> Self {
        Self::new(slug, vec![issue])
    }
}

/// One problem in a module manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestIssue {
    Parse(String),
    MissingField(&'static str),
    InvalidVersion { value: String },
    InvalidTier { value: String },
    InvalidName { value: String },
    NameMismatch { expected: String, found: String },
    EmptyVariant { variant: String },
    InvalidFileEntry { section: String, index: usize, reason: String },
}

impl fmt::Display for ManifestIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "cannot parse module.yaml: {msg}"),
            Self::MissingField(field) => write!(f, "required field '{field}' is missing"),
            Self::InvalidVersion { value } => write!(f, "version '{value}' is not valid semver"),
            Self::InvalidTier { value } => {
                write!(f, "tier '{value}' is not one of free, pro, enterprise")
            }
            Self::InvalidName { value } => write!(f, "name '{value}' is not a valid slug"),
            Self::NameMismatch { expected, found } => {
                write!(f, "name '{found}' does not match its location '{expected}'")
            }
            Self::EmptyVariant { variant } => write!(f, "variant '{variant}' declares no files"),
            Self::InvalidFileEntry {
                section,
                index,
                reason,
            } => write!(f, "{section}[{index}]: {reason}"),
        }
    }
}

// ============================================================================
// Structure errors
// ============================================================================

/// Hard structure failure raised by `ensure_module_structure`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Module '{module}' failed structure validation ({} problem(s))", messages.len())]
pub struct StructureError {
    pub module: String,
    pub messages: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_path() {
        let err = DomainError::DependencyCycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn manifest_suggestions_list_every_issue() {
        let err = DomainError::Manifest(ManifestError::new(
            "free/x",
            vec![
                ManifestIssue::MissingField("version"),
                ManifestIssue::InvalidTier { value: "gold".into() },
            ],
        ));
        let suggestions = err.suggestions();
        assert_eq!(suggestions.len(), 3);
        assert!(suggestions[2].contains("gold"));
    }
}
