//! Merging module package dependencies into host project manifests.
//!
//! Poetry manifests are edited line-wise so that comments and formatting
//! survive; new entries go between the rapidkit markers inside
//! `[tool.poetry.dependencies]`. `package.json` is edited as JSON with key
//! order preserved. In both cases an existing entry is only bumped, never
//! downgraded.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use serde::Serialize;

use crate::domain::error::DomainError;
use crate::domain::manifest::PackageDependency;

pub const POETRY_TABLE: &str = "[tool.poetry.dependencies]";
pub const BLOCK_START: &str = "# <<<rapidkit:dependencies:start>>>";
pub const BLOCK_END: &str = "# <<<rapidkit:dependencies:end>>>";

static DEP_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*"?([A-Za-z0-9_.\-]+)"?\s*=\s*(.+?)\s*$"#).expect("static regex")
});
static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^"([^"]*)"$"#).expect("static regex"));
static INLINE_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"version\s*=\s*"([^"]*)""#).expect("static regex")
});

/// What a merge changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyMerge {
    pub content: String,
    pub added: Vec<String>,
    pub upgraded: Vec<String>,
    pub kept: Vec<String>,
}

impl DependencyMerge {
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.upgraded.is_empty()
    }
}

fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase().replace('_', "-")
}

/// Parse a constraint such as `^1.2`, `>=0.29,<1` or `~=2` as the lowest
/// version it names.
pub fn lenient_version(constraint: &str) -> Option<Version> {
    let first = constraint.split(',').next()?.trim();
    let bare = first.trim_start_matches(['^', '~', '>', '<', '=', '!', ' ', 'v']);
    if bare.is_empty() || bare == "*" {
        return None;
    }
    let core: String = bare
        .split(['-', '+'])
        .next()
        .unwrap_or(bare)
        .to_string();
    let padded = match core.matches('.').count() {
        0 => format!("{core}.0.0"),
        1 => format!("{core}.0"),
        _ => core,
    };
    Version::parse(&padded).ok()
}

/// `Some(Greater)` when `candidate` names a higher version than `existing`.
pub fn compare_constraints(candidate: &str, existing: &str) -> Option<Ordering> {
    let candidate = lenient_version(candidate)?;
    let existing = lenient_version(existing)?;
    Some(candidate.cmp(&existing))
}

fn is_table_header(line: &str) -> bool {
    line.trim_start().starts_with('[')
}

/// Merge `deps` into a Poetry `pyproject.toml`.
pub fn merge_poetry(content: &str, deps: &[PackageDependency]) -> DependencyMerge {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut outcome = DependencyMerge::default();

    let header = match lines.iter().position(|l| l.trim() == POETRY_TABLE) {
        Some(i) => i,
        None => {
            if lines.last().is_some_and(|l| !l.trim().is_empty()) {
                lines.push(String::new());
            }
            lines.push(POETRY_TABLE.to_string());
            lines.len() - 1
        }
    };

    for dep in deps {
        let table_end = lines[header + 1..]
            .iter()
            .position(|l| is_table_header(l))
            .map(|p| header + 1 + p)
            .unwrap_or(lines.len());

        let wanted = normalize_name(&dep.name);
        let existing = (header + 1..table_end).find_map(|i| {
            let caps = DEP_LINE.captures(&lines[i])?;
            (normalize_name(&caps[1]) == wanted).then(|| (i, caps[2].to_string()))
        });

        match existing {
            Some((index, value)) => {
                let current = QUOTED
                    .captures(&value)
                    .or_else(|| INLINE_VERSION.captures(&value))
                    .map(|c| c[1].to_string());
                match current {
                    Some(cur) if compare_constraints(&dep.version, &cur) == Some(Ordering::Greater) => {
                        lines[index] = lines[index].replacen(
                            &format!("\"{cur}\""),
                            &format!("\"{}\"", dep.version),
                            1,
                        );
                        outcome.upgraded.push(dep.name.clone());
                    }
                    _ => outcome.kept.push(dep.name.clone()),
                }
            }
            None => {
                let end_marker = (header + 1..table_end).find(|&i| lines[i].trim() == BLOCK_END);
                let insert_at = match end_marker {
                    Some(i) => i,
                    None => {
                        let mut at = table_end;
                        while at > header + 1 && lines[at - 1].trim().is_empty() {
                            at -= 1;
                        }
                        lines.insert(at, BLOCK_START.to_string());
                        lines.insert(at + 1, BLOCK_END.to_string());
                        at + 1
                    }
                };
                lines.insert(insert_at, format!("{} = \"{}\"", dep.name, dep.version));
                outcome.added.push(dep.name.clone());
            }
        }
    }

    let mut text = lines.join("\n");
    text.push('\n');
    outcome.content = text;
    outcome
}

/// Merge `deps` into the `dependencies` object of a `package.json`.
pub fn merge_package_json(
    content: &str,
    deps: &[PackageDependency],
) -> Result<DependencyMerge, DomainError> {
    let malformed = |reason: String| DomainError::MalformedDocument {
        document: "package.json".into(),
        reason,
    };

    let mut doc: serde_json::Value =
        serde_json::from_str(content).map_err(|e| malformed(e.to_string()))?;
    let root = doc
        .as_object_mut()
        .ok_or_else(|| malformed("top level is not an object".into()))?;
    let section = root
        .entry("dependencies")
        .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()))
        .as_object_mut()
        .ok_or_else(|| malformed("'dependencies' is not an object".into()))?;

    let mut outcome = DependencyMerge::default();
    for dep in deps {
        match section.get(&dep.name).and_then(|v| v.as_str()).map(str::to_string) {
            Some(cur) => {
                if compare_constraints(&dep.version, &cur) == Some(Ordering::Greater) {
                    section.insert(dep.name.clone(), dep.version.clone().into());
                    outcome.upgraded.push(dep.name.clone());
                } else {
                    outcome.kept.push(dep.name.clone());
                }
            }
            None => {
                section.insert(dep.name.clone(), dep.version.clone().into());
                outcome.added.push(dep.name.clone());
            }
        }
    }

    let mut text =
        serde_json::to_string_pretty(&doc).map_err(|e| malformed(e.to_string()))?;
    text.push('\n');
    outcome.content = text;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dep(name: &str, version: &str) -> PackageDependency {
        PackageDependency {
            name: name.into(),
            version: version.into(),
        }
    }

    const PYPROJECT: &str = r#"[tool.poetry]
name = "my-api"

[tool.poetry.dependencies]
python = "^3.10"
fastapi = { version = "^0.110.0", extras = ["all"] }

[build-system]
requires = ["poetry-core"]
"#;

    #[test]
    fn new_entries_land_between_markers() {
        let out = merge_poetry(PYPROJECT, &[dep("asyncpg", "^0.29.0")]);
        assert_eq!(out.added, vec!["asyncpg"]);
        assert!(out.content.contains(&format!(
            "fastapi = {{ version = \"^0.110.0\", extras = [\"all\"] }}\n{BLOCK_START}\nasyncpg = \"^0.29.0\"\n{BLOCK_END}\n\n[build-system]"
        )));
    }

    #[test]
    fn duplicates_keep_higher_version() {
        let out = merge_poetry(PYPROJECT, &[dep("fastapi", "^0.100.0"), dep("python", "^3.11")]);
        assert_eq!(out.kept, vec!["fastapi"]);
        assert_eq!(out.upgraded, vec!["python"]);
        assert!(out.content.contains("python = \"^3.11\""));
        assert!(out.content.contains("version = \"^0.110.0\""));
    }

    #[test]
    fn inline_table_version_is_bumped() {
        let out = merge_poetry(PYPROJECT, &[dep("fastapi", "^0.115.0")]);
        assert!(out.content.contains("fastapi = { version = \"^0.115.0\", extras = [\"all\"] }"));
    }

    #[test]
    fn merging_twice_is_stable() {
        let once = merge_poetry(PYPROJECT, &[dep("asyncpg", "^0.29.0")]);
        let twice = merge_poetry(&once.content, &[dep("asyncpg", "^0.29.0")]);
        assert_eq!(once.content, twice.content);
        assert!(!twice.changed());
    }

    #[test]
    fn missing_table_is_created() {
        let out = merge_poetry("[tool.poetry]\nname = \"x\"\n", &[dep("redis", "^5.0")]);
        assert!(out.content.contains("[tool.poetry.dependencies]\n# <<<rapidkit:dependencies:start>>>\nredis = \"^5.0\"\n"));
    }

    #[test]
    fn package_json_merge() {
        let json = r#"{"name": "api", "dependencies": {"@nestjs/core": "^10.0.0"}}"#;
        let out = merge_package_json(json, &[dep("@nestjs/core", "^9.0.0"), dep("pg", "^8.11.0")]).unwrap();
        assert_eq!(out.kept, vec!["@nestjs/core"]);
        assert_eq!(out.added, vec!["pg"]);
        let value: serde_json::Value = serde_json::from_str(&out.content).unwrap();
        assert_eq!(value["dependencies"]["pg"], "^8.11.0");
    }

    #[test]
    fn lenient_versions() {
        assert_eq!(lenient_version("^1.2"), Some(Version::new(1, 2, 0)));
        assert_eq!(lenient_version(">=0.29,<1"), Some(Version::new(0, 29, 0)));
        assert_eq!(lenient_version("*"), None);
    }
}
