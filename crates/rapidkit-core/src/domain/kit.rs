use serde::{Deserialize, Serialize};

use crate::domain::context::RenderContext;
use crate::domain::error::DomainError;
use crate::domain::ledger::Engine;

/// A module installed by default when a kit is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EssentialModule {
    pub slug: String,
    /// Context variable that, when explicitly `false`, skips this module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toggle: Option<String>,
}

/// `kits_root/<kit>/kit.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kit {
    pub name: String,
    pub version: String,
    pub variant: String,
    pub engine: Engine,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub essential_modules: Vec<EssentialModule>,
}

/// One boilerplate file of a kit, relative to its `files/` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KitFile {
    pub relative: String,
    pub source: String,
}

impl Kit {
    pub fn parse(yaml: &str) -> Result<Self, DomainError> {
        let kit: Self = serde_yaml_ng::from_str(yaml).map_err(|e| DomainError::MalformedDocument {
            document: "kit.yaml".into(),
            reason: e.to_string(),
        })?;
        if kit.name.trim().is_empty() || kit.variant.trim().is_empty() {
            return Err(DomainError::MalformedDocument {
                document: "kit.yaml".into(),
                reason: "'name' and 'variant' are required".into(),
            });
        }
        Ok(kit)
    }

    /// Essential modules not switched off in `vars`.
    pub fn selected_modules(&self, vars: &RenderContext) -> Vec<String> {
        self.essential_modules
            .iter()
            .filter(|m| {
                m.toggle
                    .as_deref()
                    .and_then(|t| vars.get(t))
                    .and_then(|v| v.as_bool())
                    != Some(false)
            })
            .map(|m| m.slug.clone())
            .collect()
    }
}
