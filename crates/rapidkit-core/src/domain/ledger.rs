//! Project-level records: metadata, context, installed-modules ledger and
//! the catalog lock file.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::context::ContextValue;
use crate::domain::manifest::Tier;

/// Schema tag written into the lock file.
pub const LOCK_SCHEMA_VERSION: &str = "modules-lock-v1";

/// Runtime family of a generated project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Python,
    Npm,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Python => write!(f, "python"),
            Self::Npm => write!(f, "npm"),
        }
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "poetry" | "pip" => Ok(Self::Python),
            "npm" | "node" => Ok(Self::Npm),
            other => Err(format!("unknown engine '{other}'")),
        }
    }
}

/// `.rapidkit/project.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub project_name: String,
    pub kit: String,
    pub variant: String,
    pub engine: Engine,
    pub created_at: DateTime<Utc>,
    /// Version of the kit the project was created from.
    pub version: String,
    #[serde(default)]
    pub modules: Vec<String>,
}

impl ProjectMetadata {
    pub fn add_module(&mut self, slug: &str) {
        if !self.modules.iter().any(|m| m == slug) {
            self.modules.push(slug.to_string());
        }
    }
}

/// `.rapidkit/context.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<Engine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_framework: Option<String>,
    /// Variables supplied at creation time, replayed into later installs.
    #[serde(default)]
    pub variables: BTreeMap<String, ContextValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledModule {
    pub slug: String,
    pub version: String,
    pub installed_at: DateTime<Utc>,
}

/// `registry.json` at the project root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstalledLedger {
    #[serde(default)]
    pub installed_modules: Vec<InstalledModule>,
}

impl InstalledLedger {
    /// Insert or refresh an entry; install order is preserved.
    pub fn upsert(&mut self, slug: &str, version: &str, at: DateTime<Utc>) {
        match self.installed_modules.iter_mut().find(|m| m.slug == slug) {
            Some(existing) => {
                existing.version = version.to_string();
                existing.installed_at = at;
            }
            None => self.installed_modules.push(InstalledModule {
                slug: slug.to_string(),
                version: version.to_string(),
                installed_at: at,
            }),
        }
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.installed_modules.iter().any(|m| m.slug == slug)
    }

    pub fn version_of(&self, slug: &str) -> Option<&str> {
        self.installed_modules
            .iter()
            .find(|m| m.slug == slug)
            .map(|m| m.version.as_str())
    }

    pub fn slugs(&self) -> Vec<String> {
        self.installed_modules.iter().map(|m| m.slug.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    pub version: String,
    pub tier: Tier,
    pub signed: bool,
}

/// `.rapidkit/modules.lock.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockFile {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub modules: BTreeMap<String, LockEntry>,
}

impl LockFile {
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: LOCK_SCHEMA_VERSION.to_string(),
            generated_at,
            modules: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_upsert_keeps_order_and_refreshes() {
        let t0 = Utc::now();
        let mut ledger = InstalledLedger::default();
        ledger.upsert("free/b", "1.0.0", t0);
        ledger.upsert("free/a", "1.0.0", t0);
        ledger.upsert("free/b", "1.1.0", t0);
        assert_eq!(ledger.slugs(), vec!["free/b", "free/a"]);
        assert_eq!(ledger.version_of("free/b"), Some("1.1.0"));
        assert!(!ledger.contains("free/c"));
    }

    #[test]
    fn ledger_json_shape() {
        let mut ledger = InstalledLedger::default();
        ledger.upsert("free/a", "1.0.0", Utc::now());
        let json = serde_json::to_value(&ledger).unwrap();
        assert_eq!(json["installed_modules"][0]["slug"], "free/a");
    }

    #[test]
    fn engine_aliases() {
        assert_eq!("poetry".parse::<Engine>().unwrap(), Engine::Python);
        assert_eq!("node".parse::<Engine>().unwrap(), Engine::Npm);
        assert!("cargo".parse::<Engine>().is_err());
    }
}
