//! Three-hash file status classification.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// State of a tracked file, derived from its on-disk, last-recorded and
/// freshly-rendered hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Clean,
    LocallyModified,
    TemplateUpdated,
    ManuallyUpdated,
    Diverged,
}

impl FileStatus {
    pub const ALL: [FileStatus; 5] = [
        FileStatus::Clean,
        FileStatus::LocallyModified,
        FileStatus::TemplateUpdated,
        FileStatus::ManuallyUpdated,
        FileStatus::Diverged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::LocallyModified => "locally_modified",
            Self::TemplateUpdated => "template_updated",
            Self::ManuallyUpdated => "manually_updated",
            Self::Diverged => "diverged",
        }
    }

    /// Files the generator may overwrite without asking.
    pub fn is_safe_to_write(&self) -> bool {
        matches!(self, Self::Clean | Self::TemplateUpdated)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == needle)
            .ok_or_else(|| format!("unknown file status '{s}'"))
    }
}

/// Classify a file from its three hashes.
///
/// `None` means the file is neither on disk nor tracked: it is new and the
/// generator writes it unconditionally. An untracked file that already
/// exists is compared against the render alone: identical content counts as
/// clean, anything else as diverged.
///
/// A missing file with a recorded hash is treated as locally modified (the
/// user deleted it) when the template is unchanged, otherwise as diverged.
pub fn classify(on_disk: Option<&str>, recorded: Option<&str>, rendered: &str) -> Option<FileStatus> {
    let status = match (on_disk, recorded) {
        (None, None) => return None,
        (Some(disk), None) => {
            if disk == rendered {
                FileStatus::Clean
            } else {
                FileStatus::Diverged
            }
        }
        (disk, Some(rec)) => {
            if rec == rendered {
                if disk == Some(rec) {
                    FileStatus::Clean
                } else {
                    FileStatus::LocallyModified
                }
            } else if disk == Some(rec) {
                FileStatus::TemplateUpdated
            } else if disk == Some(rendered) {
                FileStatus::ManuallyUpdated
            } else {
                FileStatus::Diverged
            }
        }
    };
    Some(status)
}

/// Parse a comma separated status filter such as `clean,template_updated`.
pub fn parse_status_filter(raw: &str) -> Result<Vec<FileStatus>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}
