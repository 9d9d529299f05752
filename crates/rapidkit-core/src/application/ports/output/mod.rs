//! Driven (output) ports - implemented by infrastructure.
//!
//! These traits define what the application needs from external systems.
//! The `rapidkit-adapters` crate provides implementations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::{
    DomainError, FileStatus, Kit, KitFile, ModuleManifest, OverrideSpec, RenderContext, SnippetCatalog,
    ValidationResult,
};
use crate::error::{RapidkitError, RapidkitResult};

/// Port for filesystem operations.
///
/// Implemented by `rapidkit_adapters::LocalFilesystem`; unit tests use an
/// in-memory fake.
///
/// `write_file` must be atomic: readers see either the old or the new
/// content, never a partial write.
#[cfg_attr(test, mockall::automock)]
pub trait Filesystem: Send + Sync {
    /// Create a directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> RapidkitResult<()>;

    /// Write content to a file, creating parent directories.
    fn write_file(&self, path: &Path, content: &str) -> RapidkitResult<()>;

    /// Append to a file, creating it if needed.
    fn append_file(&self, path: &Path, content: &str) -> RapidkitResult<()>;

    /// Read a UTF-8 file; `None` when it does not exist.
    fn read_file(&self, path: &Path) -> RapidkitResult<Option<String>>;

    /// Check if path exists.
    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// Immediate children, sorted. Empty when the directory is missing.
    fn list_dir(&self, path: &Path) -> RapidkitResult<Vec<PathBuf>>;

    fn remove_file(&self, path: &Path) -> RapidkitResult<()>;

    /// Remove a directory and all contents.
    fn remove_dir_all(&self, path: &Path) -> RapidkitResult<()>;
}

/// Port for template rendering.
///
/// Implemented by:
/// - `rapidkit_adapters::renderer::TeraRenderer` (strict Tera engine)
/// - `rapidkit_adapters::renderer::SimpleRenderer` (`{{ var }}` only)
pub trait TemplateRenderer: Send + Sync {
    /// Render `source`. `name` is the output target path and decides
    /// whether HTML escaping applies. Must be free of side effects.
    fn render(&self, name: &str, source: &str, context: &RenderContext) -> RapidkitResult<String>;
}

/// Every manifest in a catalog, with per-module failures kept apart.
#[derive(Debug, Clone, Default)]
pub struct LoadedCatalog {
    pub specs: BTreeMap<String, ModuleManifest>,
    pub errors: BTreeMap<String, RapidkitError>,
}

/// Port for the module catalog.
pub trait ModuleSource: Send + Sync {
    /// Sorted slugs of every directory holding a `module.yaml`.
    fn discover(&self) -> RapidkitResult<Vec<String>>;

    fn load_manifest(&self, slug: &str) -> RapidkitResult<ModuleManifest>;

    /// Source of a template, relative to the module's `templates/` directory.
    fn read_template(&self, slug: &str, template: &str) -> RapidkitResult<String>;

    /// The module's `overrides.yaml`, if any.
    fn load_overrides(&self, slug: &str) -> RapidkitResult<Option<OverrideSpec>>;

    /// Snippet catalog at `config`, relative to the module directory.
    fn load_snippets(&self, slug: &str, config: &str) -> RapidkitResult<SnippetCatalog>;

    fn module_path(&self, slug: &str) -> PathBuf;

    /// Load every discovered module; failures are collected, not fatal.
    fn load_all_specs(&self) -> RapidkitResult<LoadedCatalog> {
        let mut catalog = LoadedCatalog::default();
        for slug in self.discover()? {
            match self.load_manifest(&slug) {
                Ok(manifest) => {
                    catalog.specs.insert(slug, manifest);
                }
                Err(e) => {
                    catalog.errors.insert(slug, e);
                }
            }
        }
        Ok(catalog)
    }
}

/// Port for module directory checks against the structure blueprint.
///
/// Implementations refresh the module's verification file as a side
/// effect.
#[cfg_attr(test, mockall::automock)]
pub trait ModuleValidator: Send + Sync {
    fn validate<'a>(
        &self,
        slug: &str,
        manifest: Option<&'a ModuleManifest>,
    ) -> RapidkitResult<ValidationResult>;

    /// Fail with a structure error unless the module passes.
    fn ensure_module_structure<'a>(
        &self,
        slug: &str,
        manifest: Option<&'a ModuleManifest>,
    ) -> RapidkitResult<ValidationResult> {
        let result = self.validate(slug, manifest)?;
        match result.clone().into_error() {
            Some(e) => Err(DomainError::Structure(e).into()),
            None => Ok(result),
        }
    }
}

/// What a manifest's signature fields say about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    /// No `signature` field.
    Unsigned,
    Valid,
    /// Signed, but no listed signer verifies the signature.
    Invalid,
}

/// Port for manifest signature verification.
#[cfg_attr(test, mockall::automock)]
pub trait ManifestVerifier: Send + Sync {
    fn verify(&self, slug: &str) -> RapidkitResult<SignatureCheck>;
}

/// Port for project kits (boilerplate + essential modules).
pub trait KitSource: Send + Sync {
    fn load_kit(&self, name: &str) -> RapidkitResult<(Kit, Vec<KitFile>)>;

    fn list_kits(&self) -> RapidkitResult<Vec<Kit>>;
}

/// A subprocess to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str], timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: None,
            timeout,
        }
    }

    pub fn in_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Completed {
        success: bool,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    TimedOut,
    /// The program is not installed.
    NotFound,
}

/// Port for subprocess execution with timeouts.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> CommandOutcome;
}

/// One decision in an interactive merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeChoice {
    ApplyTemplate,
    KeepLocal,
    Skip,
    Quit,
}

/// Port for the interactive merge prompt (`t`/`k`/`s`/`q`).
#[cfg_attr(test, mockall::automock)]
pub trait MergePrompt: Send + Sync {
    fn choose(&self, file: &str, status: FileStatus) -> MergeChoice;
}

/// Prompt used when no terminal is attached: always skip.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractivePrompt;

impl MergePrompt for NonInteractivePrompt {
    fn choose(&self, _file: &str, _status: FileStatus) -> MergeChoice {
        MergeChoice::Skip
    }
}

/// Port for the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
