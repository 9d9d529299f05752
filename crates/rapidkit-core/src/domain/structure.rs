//! Module directory contracts.
//!
//! The blueprint is catalog-wide; [`evaluate`] checks one module's listing
//! against it. Walking the disk is the adapter's job: this module only sees
//! relative POSIX paths that already passed the ignore filter.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::common::{content_hash, slug_basename};
use crate::domain::error::{DomainError, StructureError};
use crate::domain::manifest::ModuleManifest;

/// Blueprints at or above this version enforce vendor-health rules.
pub const VENDOR_HEALTH_MIN_SPEC_VERSION: u32 = 2;
/// Output prefix that vendor-backed health modules must no longer write to.
pub const LEGACY_HEALTH_PREFIX: &str = "src/core/health";
/// Call a framework template must make when the vendor ships health files.
pub const HEALTH_SHIM_CALL: &str = "ensure_vendor_health_shim";
pub const DEFAULT_VERIFICATION_FILE: &str = ".module_verification.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureBlueprint {
    #[serde(default = "default_spec_version")]
    pub spec_version: u32,
    #[serde(default)]
    pub required_files: Vec<String>,
    #[serde(default)]
    pub required_directories: Vec<String>,
    #[serde(default)]
    pub flexible_subtrees: Vec<String>,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_verification_file")]
    pub verification_file: String,
    #[serde(default = "default_allow_extra")]
    pub allow_extra_entries: bool,
}

fn default_spec_version() -> u32 {
    1
}

fn default_verification_file() -> String {
    DEFAULT_VERIFICATION_FILE.to_string()
}

fn default_allow_extra() -> bool {
    true
}

impl Default for StructureBlueprint {
    fn default() -> Self {
        Self {
            spec_version: default_spec_version(),
            required_files: vec!["module.yaml".into()],
            required_directories: vec!["templates".into()],
            flexible_subtrees: vec!["templates".into(), "docs".into(), "tests".into()],
            ignore_patterns: vec![
                "**/__pycache__/**".into(),
                "**/*.pyc".into(),
                "**/.DS_Store".into(),
            ],
            verification_file: default_verification_file(),
            allow_extra_entries: true,
        }
    }
}

impl StructureBlueprint {
    pub fn parse(yaml: &str) -> Result<Self, DomainError> {
        serde_yaml_ng::from_str(yaml).map_err(|e| DomainError::MalformedDocument {
            document: "structure blueprint".into(),
            reason: e.to_string(),
        })
    }
}

/// Replace `{{module_slug}}` and `{{module_basename}}` tokens.
pub fn substitute_tokens(pattern: &str, slug: &str) -> String {
    let basename = slug_basename(slug);
    pattern
        .replace("{{module_slug}}", slug)
        .replace("{{ module_slug }}", slug)
        .replace("{{module_basename}}", basename)
        .replace("{{ module_basename }}", basename)
}

/// Files and directories found under a module, relative to its root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleListing {
    pub files: BTreeSet<String>,
    pub directories: BTreeSet<String>,
}

/// SHA-256 over the sorted `d:`/`f:` lines of a listing.
pub fn tree_hash(listing: &ModuleListing) -> String {
    let mut lines: Vec<String> = listing
        .directories
        .iter()
        .map(|d| format!("d:{d}"))
        .chain(listing.files.iter().map(|f| format!("f:{f}")))
        .collect();
    lines.sort();
    content_hash(lines.join("\n"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub module: String,
    pub module_path: String,
    pub valid: bool,
    pub parity_valid: bool,
    pub spec_version: u32,
    pub missing_files: Vec<String>,
    pub missing_directories: Vec<String>,
    pub extra_files: Vec<String>,
    pub extra_directories: Vec<String>,
    pub verification_file: String,
    pub tree_hash: String,
    pub messages: Vec<String>,
}

impl ValidationResult {
    pub fn into_error(self) -> Option<StructureError> {
        if self.valid && self.parity_valid {
            return None;
        }
        let mut messages = self.messages;
        messages.extend(self.missing_files.iter().map(|f| format!("missing file: {f}")));
        messages.extend(
            self.missing_directories
                .iter()
                .map(|d| format!("missing directory: {d}")),
        );
        messages.extend(self.extra_files.iter().map(|f| format!("unexpected file: {f}")));
        messages.extend(
            self.extra_directories
                .iter()
                .map(|d| format!("unexpected directory: {d}")),
        );
        Some(StructureError {
            module: self.module,
            messages,
        })
    }
}

fn within(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    path == prefix || path.starts_with(&format!("{prefix}/"))
}

/// Check `listing` against `blueprint`.
///
/// `read_template` resolves a template path (relative to the module's
/// `templates/` directory) to its source, and is only consulted for the
/// vendor-health rules.
pub fn evaluate(
    blueprint: &StructureBlueprint,
    slug: &str,
    module_path: &str,
    listing: &ModuleListing,
    manifest: Option<&ModuleManifest>,
    read_template: &dyn Fn(&str) -> Option<String>,
) -> ValidationResult {
    let required_files: BTreeSet<String> = blueprint
        .required_files
        .iter()
        .map(|f| substitute_tokens(f, slug))
        .collect();
    let required_dirs: BTreeSet<String> = blueprint
        .required_directories
        .iter()
        .map(|d| substitute_tokens(d, slug))
        .collect();
    let flexible: Vec<String> = blueprint
        .flexible_subtrees
        .iter()
        .map(|d| substitute_tokens(d, slug))
        .collect();

    let missing_files: Vec<String> = required_files
        .iter()
        .filter(|f| !listing.files.contains(*f))
        .cloned()
        .collect();
    let missing_directories: Vec<String> = required_dirs
        .iter()
        .filter(|d| !listing.directories.contains(*d))
        .cloned()
        .collect();

    let mut extra_files = Vec::new();
    let mut extra_directories = Vec::new();
    if !blueprint.allow_extra_entries {
        let allowed = |path: &str, is_dir: bool| {
            if flexible.iter().any(|f| within(path, f)) {
                return true;
            }
            if is_dir {
                required_dirs.contains(path)
                    || required_files.iter().any(|f| within(f, path))
                    || required_dirs.iter().any(|d| within(d, path))
            } else {
                required_files.contains(path) || path == blueprint.verification_file
            }
        };
        extra_files = listing
            .files
            .iter()
            .filter(|f| !allowed(f, false))
            .cloned()
            .collect();
        extra_directories = listing
            .directories
            .iter()
            .filter(|d| !allowed(d, true))
            .cloned()
            .collect();
    }

    let messages = match manifest {
        Some(m) if blueprint.spec_version >= VENDOR_HEALTH_MIN_SPEC_VERSION => {
            vendor_health_violations(m, read_template)
        }
        _ => Vec::new(),
    };

    let valid = missing_files.is_empty()
        && missing_directories.is_empty()
        && extra_files.is_empty()
        && extra_directories.is_empty();

    ValidationResult {
        module: slug.to_string(),
        module_path: module_path.to_string(),
        valid,
        parity_valid: messages.is_empty(),
        spec_version: blueprint.spec_version,
        missing_files,
        missing_directories,
        extra_files,
        extra_directories,
        verification_file: blueprint.verification_file.clone(),
        tree_hash: tree_hash(listing),
        messages,
    }
}

/// Vendor-backed health modules must wire the shim and avoid legacy paths.
pub fn vendor_health_violations(
    manifest: &ModuleManifest,
    read_template: &dyn Fn(&str) -> Option<String>,
) -> Vec<String> {
    if !manifest.declares_vendor_health() {
        return Vec::new();
    }
    let mut messages = Vec::new();

    let variant_files = manifest
        .generation
        .variants
        .values()
        .flat_map(|v| v.files.iter());

    let mut shim_found = false;
    for file in variant_files {
        if let Some(output) = &file.output
            && within(output, LEGACY_HEALTH_PREFIX)
        {
            messages.push(format!(
                "output '{output}' writes to legacy path '{LEGACY_HEALTH_PREFIX}/'"
            ));
        }
        if let Some(template) = &file.template
            && read_template(template).is_some_and(|src| src.contains(HEALTH_SHIM_CALL))
        {
            shim_found = true;
        }
    }
    if !shim_found {
        messages.push(format!(
            "vendor ships health files but no framework template calls {HEALTH_SHIM_CALL}"
        ));
    }
    messages
}

/// Contents of a module's verification file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub structure_valid: bool,
    pub parity_valid: bool,
    pub tree_hash: String,
    pub checked_at: DateTime<Utc>,
}

impl VerificationRecord {
    /// New record for `result`, reusing `previous` untouched when nothing
    /// but the timestamp would change.
    pub fn refresh(
        previous: Option<VerificationRecord>,
        result: &ValidationResult,
        now: DateTime<Utc>,
    ) -> (Self, bool) {
        if let Some(prev) = previous
            && prev.structure_valid == result.valid
            && prev.parity_valid == result.parity_valid
            && prev.tree_hash == result.tree_hash
        {
            return (prev, false);
        }
        let record = Self {
            structure_valid: result.valid,
            parity_valid: result.parity_valid,
            tree_hash: result.tree_hash.clone(),
            checked_at: now,
        };
        (record, true)
    }
}
