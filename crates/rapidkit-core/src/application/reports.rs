//! JSON report payloads. Every report carries a `schema_version` tag.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{FileStatus, Tier};

pub const DIFF_MODULE_SCHEMA: &str = "diff-module-v1";
pub const DIFF_MERGE_SCHEMA: &str = "diff-merge-v1";
pub const DIFF_ALL_SCHEMA: &str = "diff-all-v1";
pub const UPGRADE_MODULE_SCHEMA: &str = "upgrade-module-v1";
pub const UPGRADE_BATCH_SCHEMA: &str = "upgrade-batch-v1";
pub const MERGE_MODULE_SCHEMA: &str = "merge-module-v1";
pub const SNAPSHOT_GC_SCHEMA: &str = "snapshot-gc-v1";
pub const SNIPPETS_RECONCILE_SCHEMA: &str = "snippets-reconcile-v1";
pub const MODULES_OUTDATED_SCHEMA: &str = "modules-outdated-v1";
pub const MODULES_VALIDATE_SCHEMA: &str = "modules-validate-v1";
pub const MODULES_SUMMARY_SCHEMA: &str = "modules-summary-v1";
pub const MODULES_VERIFY_SCHEMA: &str = "modules-verify-v1";
pub const MODULES_SIGN_SCHEMA: &str = "modules-sign-v1";

/// File state as reported: the five classes plus `new`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedStatus {
    New,
    Clean,
    LocallyModified,
    TemplateUpdated,
    ManuallyUpdated,
    Diverged,
}

impl From<Option<FileStatus>> for ReportedStatus {
    fn from(status: Option<FileStatus>) -> Self {
        match status {
            None => Self::New,
            Some(FileStatus::Clean) => Self::Clean,
            Some(FileStatus::LocallyModified) => Self::LocallyModified,
            Some(FileStatus::TemplateUpdated) => Self::TemplateUpdated,
            Some(FileStatus::ManuallyUpdated) => Self::ManuallyUpdated,
            Some(FileStatus::Diverged) => Self::Diverged,
        }
    }
}

impl std::str::FromStr for ReportedStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "new" {
            return Ok(Self::New);
        }
        s.parse::<FileStatus>().map(|status| Some(status).into())
    }
}

impl ReportedStatus {
    /// Parse a comma separated filter such as `new,clean,template_updated`.
    pub fn parse_filter(raw: &str) -> Result<Vec<Self>, String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Clean => "clean",
            Self::LocallyModified => "locally_modified",
            Self::TemplateUpdated => "template_updated",
            Self::ManuallyUpdated => "manually_updated",
            Self::Diverged => "diverged",
        }
    }
}

// ============================================================================
// Diff
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileHashes {
    pub current: Option<String>,
    pub recorded: Option<String>,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub file: String,
    pub status: ReportedStatus,
    pub hashes: FileHashes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDiff {
    pub schema_version: &'static str,
    pub module: String,
    pub installed_version: Option<String>,
    pub catalog_version: String,
    pub files: Vec<FileDiff>,
    pub summary: BTreeMap<ReportedStatus, usize>,
}

impl ModuleDiff {
    /// Files whose status is anything but `clean`.
    pub fn non_clean(&self) -> impl Iterator<Item = &FileDiff> {
        self.files.iter().filter(|f| f.status != ReportedStatus::Clean)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeSide {
    pub hash: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeTriple {
    pub base: MergeSide,
    pub current: MergeSide,
    pub template: MergeSide,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeFile {
    pub file: String,
    pub status: ReportedStatus,
    pub merge: MergeTriple,
}

/// `diff module --merge-json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergePayload {
    pub schema_version: &'static str,
    pub module: String,
    pub files: Vec<MergeFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllDiff {
    pub schema_version: &'static str,
    pub modules: Vec<ModuleDiff>,
}

// ============================================================================
// Upgrade
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedFile {
    pub file: String,
    pub status_before: ReportedStatus,
    pub status_after: ReportedStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub file: String,
    pub status: ReportedStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeReport {
    pub schema_version: &'static str,
    pub module: String,
    pub from_version: Option<String>,
    pub to_version: String,
    pub dry_run: bool,
    pub only_statuses: Vec<ReportedStatus>,
    pub planned: Vec<PlannedFile>,
    pub skipped: Vec<SkippedFile>,
    pub applied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchError {
    pub module: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchUpgradeReport {
    pub schema_version: &'static str,
    pub dry_run: bool,
    pub modules: Vec<UpgradeReport>,
    pub errors: Vec<BatchError>,
}

// ============================================================================
// Merge
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    PreferTemplate,
    Prompt,
    KeepLocal,
}

impl std::str::FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prefer-template" => Ok(Self::PreferTemplate),
            "prompt" => Ok(Self::Prompt),
            "keep-local" => Ok(Self::KeepLocal),
            other => Err(format!(
                "unknown strategy '{other}' (expected prefer-template, prompt or keep-local)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeDecision {
    ApplyTemplate,
    KeepLocal,
    Skip,
    /// File already matches the template.
    Noop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeAction {
    pub file: String,
    pub status_before: ReportedStatus,
    pub decision: MergeDecision,
    pub will_update: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub schema_version: &'static str,
    pub module: String,
    pub strategy: MergeStrategy,
    pub dry_run: bool,
    pub actions: Vec<MergeAction>,
    /// The user quit part-way; decisions made before were still applied.
    pub aborted: bool,
}

// ============================================================================
// Snapshots and snippets
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotGcReport {
    pub schema_version: &'static str,
    pub dry_run: bool,
    pub keep_limit: usize,
    pub kept: usize,
    pub deleted: usize,
    pub kept_entries: Vec<String>,
    pub deleted_entries: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub pending_before: usize,
    pub applied: usize,
    pub failed: usize,
    pub pending_after: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub schema_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<Vec<String>>,
    #[serde(flatten)]
    pub stats: ReconcileStats,
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutdatedEntry {
    pub module: String,
    pub locked: String,
    pub available: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutdatedReport {
    pub schema_version: &'static str,
    /// `lock` or `ledger`.
    pub baseline: &'static str,
    pub outdated: Vec<OutdatedEntry>,
    pub missing: Vec<String>,
    pub up_to_date: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleValidation {
    pub module: String,
    pub manifest_errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<crate::domain::ValidationResult>,
}

impl ModuleValidation {
    pub fn is_valid(&self) -> bool {
        self.manifest_errors.is_empty()
            && self
                .structure
                .as_ref()
                .is_none_or(|s| s.valid && s.parity_valid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidateReport {
    pub schema_version: &'static str,
    pub valid: usize,
    pub invalid: usize,
    pub modules: Vec<ModuleValidation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryReport {
    pub schema_version: &'static str,
    pub total: usize,
    pub by_tier: BTreeMap<Tier, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub signed: usize,
    pub errors: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignReport {
    pub schema_version: &'static str,
    pub signer_id: String,
    pub signed: Vec<String>,
    pub unchanged: Vec<String>,
    pub errors: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub schema_version: &'static str,
    pub valid: Vec<String>,
    pub errors: BTreeMap<String, String>,
}

impl VerifyReport {
    pub fn message(&self) -> String {
        if self.errors.is_empty() {
            format!(
                "All modules verified. Valid: {}, Errors: 0",
                self.valid.len()
            )
        } else {
            format!(
                "Verification failed. Valid: {}, Errors: {}",
                self.valid.len(),
                self.errors.len()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_report_is_flat() {
        let report = ReconcileReport {
            schema_version: SNIPPETS_RECONCILE_SCHEMA,
            scope: None,
            stats: ReconcileStats {
                pending_before: 1,
                applied: 1,
                ..ReconcileStats::default()
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["pending_before"], 1);
        assert_eq!(json["applied"], 1);
        assert!(json.get("scope").is_none());
    }

    #[test]
    fn verify_message() {
        let report = VerifyReport {
            schema_version: MODULES_VERIFY_SCHEMA,
            valid: vec!["a".into(), "b".into()],
            errors: BTreeMap::new(),
        };
        assert_eq!(report.message(), "All modules verified. Valid: 2, Errors: 0");
    }

    #[test]
    fn statuses_serialize_snake_case() {
        let json = serde_json::to_string(&ReportedStatus::LocallyModified).unwrap();
        assert_eq!(json, "\"locally_modified\"");
        assert_eq!(
            serde_json::to_string(&MergeDecision::ApplyTemplate).unwrap(),
            "\"apply_template\""
        );
    }
}
