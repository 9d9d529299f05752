//! Declarative per-module overrides (`overrides.yaml`).
//!
//! ```yaml
//! overrides:
//!   - key: default_currency
//!     type: string
//!     default: USD
//!   - key: enable_audit
//!     env: INVENTORY_AUDIT
//!     type: bool
//! ```
//!
//! Each entry reads one environment variable (default name
//! `RAPIDKIT_<MODULE>_<KEY>`) and writes the typed value into the render
//! context before anything is rendered.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::context::{ContextValue, RenderContext};
use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideType {
    #[default]
    String,
    Bool,
    Int,
    /// Comma separated.
    List,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideEntry {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: OverrideType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ContextValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideSpec {
    #[serde(default)]
    pub overrides: Vec<OverrideEntry>,
}

/// `RAPIDKIT_<MODULE>_<KEY>`, upper-cased with `-` folded to `_`.
pub fn default_env_name(module_basename: &str, key: &str) -> String {
    format!("RAPIDKIT_{module_basename}_{key}")
        .to_ascii_uppercase()
        .replace(['-', '.', '/'], "_")
}

impl OverrideSpec {
    pub fn parse(yaml: &str) -> Result<Self, DomainError> {
        serde_yaml_ng::from_str(yaml).map_err(|e| DomainError::InvalidOverride {
            key: "overrides.yaml".into(),
            reason: e.to_string(),
        })
    }

    /// Apply every override to `ctx`, reading values from `env`.
    ///
    /// Absent variables fall back to the entry's `default`; with neither the
    /// context is left untouched. Returns the keys that were set.
    pub fn apply(
        &self,
        module_basename: &str,
        ctx: &mut RenderContext,
        env: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, DomainError> {
        let mut applied = Vec::new();
        for entry in &self.overrides {
            let var = entry
                .env
                .clone()
                .unwrap_or_else(|| default_env_name(module_basename, &entry.key));

            let value = match env.get(&var) {
                Some(raw) => convert(&entry.key, entry.kind, raw)?,
                None => match &entry.default {
                    Some(default) => default.clone(),
                    None => continue,
                },
            };
            ctx.insert(entry.key.clone(), value);
            applied.push(entry.key.clone());
        }
        Ok(applied)
    }
}

fn convert(key: &str, kind: OverrideType, raw: &str) -> Result<ContextValue, DomainError> {
    let invalid = |reason: String| DomainError::InvalidOverride {
        key: key.to_string(),
        reason,
    };
    Ok(match kind {
        OverrideType::String => ContextValue::String(raw.to_string()),
        OverrideType::Bool => ContextValue::String(raw.to_string())
            .as_bool()
            .map(ContextValue::Bool)
            .ok_or_else(|| invalid(format!("'{raw}' is not a boolean")))?,
        OverrideType::Int => raw
            .trim()
            .parse::<i64>()
            .map(ContextValue::Int)
            .map_err(|_| invalid(format!("'{raw}' is not an integer")))?,
        OverrideType::List => ContextValue::List(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ContextValue::from)
                .collect(),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"
overrides:
  - key: default_currency
    default: USD
  - key: enable_audit
    env: INVENTORY_AUDIT
    type: bool
  - key: page_size
    type: int
  - key: regions
    type: list
"#;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn env_name_defaults() {
        assert_eq!(default_env_name("inventory", "default_currency"), "RAPIDKIT_INVENTORY_DEFAULT_CURRENCY");
        assert_eq!(default_env_name("rate-limit", "max"), "RAPIDKIT_RATE_LIMIT_MAX");
    }

    #[test]
    fn applies_typed_values_and_defaults() {
        let spec = OverrideSpec::parse(SPEC).unwrap();
        let mut ctx = RenderContext::new();
        let applied = spec
            .apply(
                "inventory",
                &mut ctx,
                &env(&[
                    ("INVENTORY_AUDIT", "yes"),
                    ("RAPIDKIT_INVENTORY_PAGE_SIZE", "50"),
                    ("RAPIDKIT_INVENTORY_REGIONS", "eu, us"),
                ]),
            )
            .unwrap();
        assert_eq!(applied.len(), 4);
        assert_eq!(ctx.get_str("default_currency"), Some("USD"));
        assert_eq!(ctx.get("enable_audit"), Some(&ContextValue::Bool(true)));
        assert_eq!(ctx.get("page_size"), Some(&ContextValue::Int(50)));
        assert_eq!(
            ctx.get("regions"),
            Some(&ContextValue::List(vec!["eu".into(), "us".into()]))
        );
    }

    #[test]
    fn env_wins_over_default() {
        let spec = OverrideSpec::parse(SPEC).unwrap();
        let mut ctx = RenderContext::new();
        spec.apply(
            "inventory",
            &mut ctx,
            &env(&[("RAPIDKIT_INVENTORY_DEFAULT_CURRENCY", "EUR")]),
        )
        .unwrap();
        assert_eq!(ctx.get_str("default_currency"), Some("EUR"));
        assert!(!ctx.contains("page_size"));
    }

    #[test]
    fn bad_integer_is_an_error() {
        let spec = OverrideSpec::parse(SPEC).unwrap();
        let mut ctx = RenderContext::new();
        let err = spec
            .apply("inventory", &mut ctx, &env(&[("RAPIDKIT_INVENTORY_PAGE_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidOverride { key, .. } if key == "page_size"));
    }
}
