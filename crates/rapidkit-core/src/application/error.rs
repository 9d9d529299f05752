//! Application layer errors.
//!
//! These errors represent failures in orchestration, not business logic.
//! Business logic errors are `DomainError` from `crate::domain`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::error::ErrorCategory;

/// Errors that occur during application orchestration.
#[derive(Debug, Error, Clone)]
pub enum ApplicationError {
    /// Generation failed with a caller-chosen exit code.
    #[error("{message}")]
    Generator {
        message: String,
        exit_code: i32,
        context: BTreeMap<String, String>,
    },

    #[error("Module '{slug}' not found in catalog")]
    ModuleNotFound { slug: String },

    #[error("Module '{module}' has no variant '{variant}'")]
    UnknownVariant {
        module: String,
        variant: String,
        available: Vec<String>,
    },

    #[error("No framework plugin named '{name}'")]
    UnknownFramework { name: String },

    #[error("Requirements for '{framework}' not met: {}", errors.join("; "))]
    RequirementsFailed {
        framework: String,
        errors: Vec<String>,
    },

    #[error("Template '{template}' not found in module '{module}'")]
    TemplateNotFound { module: String, template: String },

    /// Strict rendering: a variable used by the template is missing.
    #[error("Template '{template}' references undefined variable '{variable}'")]
    UndefinedVariable { template: String, variable: String },

    #[error("Template rendering failed for '{template}': {reason}")]
    RenderingFailed { template: String, reason: String },

    #[error("Filesystem error at {path}: {reason}")]
    FilesystemError { path: PathBuf, reason: String },

    #[error("Command '{program}' failed: {reason}")]
    CommandFailed { program: String, reason: String },

    #[error("Project already exists at {path}")]
    ProjectExists { path: PathBuf },

    #[error("No RapidKit project at {path}")]
    ProjectNotInitialized { path: PathBuf },

    #[error("Snippet '{snippet}' has a malformed block in {file}")]
    InjectionConflict { snippet: String, file: String },

    #[error("Signature check failed for '{module}': {reason}")]
    SignatureError { module: String, reason: String },

    #[error("Snapshot '{id}' not found")]
    SnapshotNotFound { id: String },

    #[error("Kit '{kit}' not found")]
    KitNotFound { kit: String },

    #[error("Framework plugin '{name}' is registered twice")]
    DuplicatePlugin { name: String },

    #[error("Cannot load plugin from {source_path}: {reason}")]
    PluginLoadFailed { source_path: String, reason: String },

    #[error("Cannot read or write {document}: {reason}")]
    Serialization { document: String, reason: String },

    /// Validation failed (application-level, not domain).
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

}

impl ApplicationError {
    /// Generator error with the default exit code.
    pub fn generator(message: impl Into<String>) -> Self {
        Self::Generator {
            message: message.into(),
            exit_code: 1,
            context: BTreeMap::new(),
        }
    }

    pub fn serialization(document: impl Into<String>, reason: impl ToString) -> Self {
        Self::Serialization {
            document: document.into(),
            reason: reason.to_string(),
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::FilesystemError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Get user-actionable suggestions.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ModuleNotFound { .. } => vec![
                "Check the slug, e.g. 'free/essentials/settings'".into(),
                "Try: rapidkit modules summary".into(),
            ],
            Self::UnknownVariant { available, .. } => vec![format!(
                "Available variants: {}",
                if available.is_empty() {
                    "(none)".to_string()
                } else {
                    available.join(", ")
                }
            )],
            Self::UnknownFramework { .. } => vec![
                "Built-in frameworks are 'fastapi' and 'nestjs'".into(),
                "Declarative plugins are loaded from the configured plugins_dir".into(),
            ],
            Self::RequirementsFailed { errors, .. } => {
                let mut out: Vec<String> = errors.clone();
                out.push("Set generation.check_requirements = false to skip this check".into());
                out
            }
            Self::UndefinedVariable { variable, .. } => vec![
                format!("Pass it explicitly: --var {variable}=<value>"),
                "Or add a default under generation.defaults in module.yaml".into(),
            ],
            Self::FilesystemError { path, .. } => vec![
                format!("Failed to access: {}", path.display()),
                "Check that you have write permissions".into(),
            ],
            Self::ProjectExists { path } => vec![
                format!("Directory already exists: {}", path.display()),
                "Use --force to overwrite (destructive)".into(),
                "Choose a different project name".into(),
            ],
            Self::ProjectNotInitialized { .. } => vec![
                "Run this inside a project created by 'rapidkit create'".into(),
                "Or point at one with --project <dir>".into(),
            ],
            Self::InjectionConflict { file, .. } => vec![
                format!("Fix the start/end markers in {file} by hand"),
                "Then run: rapidkit snippets reconcile".into(),
            ],
            Self::SignatureError { .. } => vec![
                "Re-sign the catalog: rapidkit modules sign-all --key <base64>".into(),
            ],
            Self::SnapshotNotFound { .. } => vec!["Try: rapidkit snapshot list".into()],
            Self::KitNotFound { .. } => vec!["Check kits_root in: rapidkit config list".into()],
            Self::DuplicatePlugin { name } => vec![format!(
                "Remove one of the plugin descriptors named '{name}'"
            )],
            _ => vec!["Check the error details above".into()],
        }
    }

    /// Get error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Generator { .. }
            | Self::UnknownVariant { .. }
            | Self::RequirementsFailed { .. }
            | Self::TemplateNotFound { .. }
            | Self::UndefinedVariable { .. }
            | Self::RenderingFailed { .. } => ErrorCategory::Generator,
            Self::ModuleNotFound { .. }
            | Self::UnknownFramework { .. }
            | Self::ProjectNotInitialized { .. }
            | Self::SnapshotNotFound { .. }
            | Self::KitNotFound { .. } => ErrorCategory::NotFound,
            Self::SignatureError { .. } | Self::ValidationFailed(_) => ErrorCategory::Validation,
            Self::ProjectExists { .. } | Self::InjectionConflict { .. } => ErrorCategory::Conflict,
            Self::DuplicatePlugin { .. } | Self::PluginLoadFailed { .. } => {
                ErrorCategory::Configuration
            }
            Self::FilesystemError { .. }
            | Self::CommandFailed { .. }
            | Self::Serialization { .. } => ErrorCategory::Internal,
        }
    }
}
