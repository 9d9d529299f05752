//! Snippet catalog, registry and anchor-marker text operations.
//!
//! Two marker schemes live in target files:
//!
//! ```text
//! # <<<inject:settings_fields>>>
//! # <<<inject:settings_fields:db_postgres_settings_fields:start>>>
//! DATABASE_URL: str = "postgresql://localhost/app"
//! # <<<inject:settings_fields:db_postgres_settings_fields:end>>>
//! ```
//!
//! The anchor line marks the insertion point. Blocks attached to one
//! anchor sit directly below it in [`order_key`] order and are replaced in
//! place on later runs. The comment token (`#` or `//`) and the
//! indentation are taken from the anchor line; the file keeps its line
//! endings.

use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::common::slug_basename;
use crate::domain::context::ContextValue;
use crate::domain::error::DomainError;

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnippetStatus {
    Applied,
    Pending,
    Conflicted,
    Skipped,
    Failed,
}

impl fmt::Display for SnippetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Applied => "applied",
            Self::Pending => "pending",
            Self::Conflicted => "conflicted",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How an already-present block is treated on re-injection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Keep existing lines and append rendered lines that are missing.
    Merge,
    /// Replace the block body with the fresh render.
    #[default]
    Override,
    /// Never touch a block once it exists.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnippetRecord {
    pub status: SnippetStatus,
    pub file: String,
    pub anchor: String,
    pub version: String,
    #[serde(default)]
    pub priority: i32,
    pub template: String,
    /// Producer module.
    pub module_slug: String,
    /// Module hosting the destination file, when different from the producer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_module: Option<String>,
    #[serde(default)]
    pub context: BTreeMap<String, ContextValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `.rapidkit/snippet_registry.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnippetRegistry {
    entries: BTreeMap<String, SnippetRecord>,
}

impl SnippetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `"<snippet_id>::<basename_of_file>"`.
    pub fn key(snippet_id: &str, file: &str) -> String {
        format!("{snippet_id}::{}", slug_basename(file))
    }

    pub fn upsert(&mut self, key: String, record: SnippetRecord) {
        self.entries.insert(key, record);
    }

    pub fn get(&self, key: &str) -> Option<&SnippetRecord> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut SnippetRecord> {
        self.entries.get_mut(key)
    }

    /// Keys of every `pending` entry, in key order.
    pub fn pending_keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, r)| r.status == SnippetStatus::Pending)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn count(&self, status: SnippetStatus) -> usize {
        self.entries.values().filter(|r| r.status == status).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SnippetRecord)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// One entry of a module's snippet catalog (`snippets.yaml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnippetDefinition {
    pub id: String,
    /// Destination file, project-relative.
    pub target: String,
    pub anchor: String,
    /// Template path relative to the module's `templates/` directory.
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_snippet_version")]
    pub version: String,
    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
    /// Variants this snippet applies to; empty means all.
    #[serde(default)]
    pub variants: Vec<String>,
    #[serde(default)]
    pub context: BTreeMap<String, ContextValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

fn default_snippet_version() -> String {
    "1.0.0".to_string()
}

impl SnippetDefinition {
    pub fn applies_to(&self, variant: &str) -> bool {
        self.variants.is_empty() || self.variants.iter().any(|v| v == variant)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnippetCatalog {
    #[serde(default)]
    pub snippets: Vec<SnippetDefinition>,
}

impl SnippetCatalog {
    pub fn parse(yaml: &str) -> Result<Self, DomainError> {
        let catalog: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| DomainError::InvalidSnippet(e.to_string()))?;
        for snippet in &catalog.snippets {
            if snippet.id.is_empty() || snippet.anchor.is_empty() {
                return Err(DomainError::InvalidSnippet(
                    "every snippet needs an id and an anchor".into(),
                ));
            }
            if snippet.id.contains(':') || snippet.anchor.contains(':') {
                return Err(DomainError::InvalidSnippet(format!(
                    "snippet '{}': ids and anchors cannot contain ':'",
                    snippet.id
                )));
            }
        }
        Ok(catalog)
    }
}

/// Position of a block on a shared anchor: higher priority first, then
/// producer slug, then snippet id.
pub fn order_key<'a>(priority: i32, producer: &'a str, id: &'a str) -> (Reverse<i32>, &'a str, &'a str) {
    (Reverse(priority), producer, id)
}

/// [`order_key`] over `(producer, definition)` pairs.
pub fn injection_order(
    a: (&str, &SnippetDefinition),
    b: (&str, &SnippetDefinition),
) -> Ordering {
    order_key(a.1.priority, a.0, &a.1.id).cmp(&order_key(b.1.priority, b.0, &b.1.id))
}

// ============================================================================
// Text operations
// ============================================================================

/// A located `<<<inject:name>>>` anchor line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorLine {
    pub index: usize,
    pub indent: String,
    pub comment: String,
}

/// Where a ranged block stands in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockState {
    Absent,
    Complete { start: usize, end: usize },
    Malformed,
}

/// Result of applying a snippet to file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injection {
    Inserted(String),
    Replaced(String),
    /// Content already matches; nothing to write.
    Unchanged,
    /// Block exists and the resolution forbids touching it.
    Kept,
}

impl Injection {
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Inserted(c) | Self::Replaced(c) => Some(c),
            Self::Unchanged | Self::Kept => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionFailure {
    AnchorMissing,
    Malformed,
}

fn split_comment(line: &str) -> Option<(&str, &str, &str)> {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];
    let (comment, rest) = if let Some(rest) = trimmed.strip_prefix("//") {
        ("//", rest)
    } else if let Some(rest) = trimmed.strip_prefix('#') {
        ("#", rest)
    } else {
        return None;
    };
    Some((indent, comment, rest.trim()))
}

pub fn find_anchor(content: &str, anchor: &str) -> Option<AnchorLine> {
    let wanted = format!("<<<inject:{anchor}>>>");
    content.lines().enumerate().find_map(|(index, line)| {
        let (indent, comment, marker) = split_comment(line)?;
        (marker == wanted).then(|| AnchorLine {
            index,
            indent: indent.to_string(),
            comment: comment.to_string(),
        })
    })
}

fn marker(anchor: &str, id: &str, edge: &str) -> String {
    format!("<<<inject:{anchor}:{id}:{edge}>>>")
}

fn marker_lines(lines: &[&str], wanted: &str) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, l)| split_comment(l).is_some_and(|(_, _, m)| m == wanted))
        .map(|(i, _)| i)
        .collect()
}

pub fn find_block(content: &str, anchor: &str, id: &str) -> BlockState {
    let lines: Vec<&str> = content.lines().collect();
    let starts = marker_lines(&lines, &marker(anchor, id, "start"));
    let ends = marker_lines(&lines, &marker(anchor, id, "end"));
    match (starts.as_slice(), ends.as_slice()) {
        ([], []) => BlockState::Absent,
        ([start], [end]) if start < end => BlockState::Complete {
            start: *start,
            end: *end,
        },
        _ => BlockState::Malformed,
    }
}

/// Snippet id of a `<<<inject:anchor:<id>:start>>>` line.
fn block_start_id<'a>(line: &'a str, anchor: &str) -> Option<&'a str> {
    let (_, _, m) = split_comment(line)?;
    m.strip_prefix("<<<inject:")?
        .strip_prefix(anchor)?
        .strip_prefix(':')?
        .strip_suffix(":start>>>")
}

fn is_block_end_for(line: &str, anchor: &str) -> bool {
    let prefix = format!("<<<inject:{anchor}:");
    split_comment(line).is_some_and(|(_, _, m)| m.starts_with(&prefix) && m.ends_with(":end>>>"))
}

fn indent_body(body: &str, indent: &str) -> Vec<String> {
    body.trim_end_matches(['\n', '\r'])
        .lines()
        .map(|l| {
            if l.trim().is_empty() {
                String::new()
            } else {
                format!("{indent}{l}")
            }
        })
        .collect()
}

fn line_ending(content: &str) -> &'static str {
    if content.contains("\r\n") { "\r\n" } else { "\n" }
}

fn join(lines: &[String], trailing_newline: bool, eol: &str) -> String {
    let mut out = lines.join(eol);
    if trailing_newline {
        out.push_str(eol);
    }
    out
}

/// Insert or refresh the ranged block `id` attached to `anchor`. A new
/// block goes below every block already on the anchor.
pub fn inject(
    content: &str,
    anchor: &str,
    id: &str,
    body: &str,
    resolution: ConflictResolution,
) -> Result<Injection, InjectionFailure> {
    inject_ordered(content, anchor, id, body, resolution, |_| false)
}

/// Like [`inject`], but a new block is placed above the first existing
/// block on the anchor for which `goes_before(existing_id)` holds.
pub fn inject_ordered(
    content: &str,
    anchor: &str,
    id: &str,
    body: &str,
    resolution: ConflictResolution,
    goes_before: impl Fn(&str) -> bool,
) -> Result<Injection, InjectionFailure> {
    let trailing = content.ends_with('\n') || content.is_empty();
    let eol = line_ending(content);
    let lines: Vec<&str> = content.lines().collect();

    match find_block(content, anchor, id) {
        BlockState::Malformed => Err(InjectionFailure::Malformed),
        BlockState::Complete { start, end } => {
            if resolution == ConflictResolution::Skip {
                return Ok(Injection::Kept);
            }
            let indent = split_comment(lines[start])
                .map(|(i, _, _)| i.to_string())
                .unwrap_or_default();
            let fresh = indent_body(body, &indent);
            let existing: Vec<String> = lines[start + 1..end].iter().map(|l| l.to_string()).collect();

            let new_body = match resolution {
                ConflictResolution::Merge => {
                    let mut merged = existing.clone();
                    for line in fresh {
                        if !merged.contains(&line) {
                            merged.push(line);
                        }
                    }
                    merged
                }
                _ => fresh,
            };
            if new_body == existing {
                return Ok(Injection::Unchanged);
            }

            let mut out: Vec<String> = lines[..=start].iter().map(|l| l.to_string()).collect();
            out.extend(new_body);
            out.extend(lines[end..].iter().map(|l| l.to_string()));
            Ok(Injection::Replaced(join(&out, trailing, eol)))
        }
        BlockState::Absent => {
            let found = find_anchor(content, anchor).ok_or(InjectionFailure::AnchorMissing)?;

            let mut insert_at = found.index + 1;
            while insert_at < lines.len() {
                let Some(existing) = block_start_id(lines[insert_at], anchor) else {
                    break;
                };
                if goes_before(existing) {
                    break;
                }
                let Some(offset) = lines[insert_at..]
                    .iter()
                    .position(|l| is_block_end_for(l, anchor))
                else {
                    return Err(InjectionFailure::Malformed);
                };
                insert_at += offset + 1;
            }

            let prefix = format!("{}{}", found.indent, found.comment);
            let mut block = vec![format!("{prefix} {}", marker(anchor, id, "start"))];
            block.extend(indent_body(body, &found.indent));
            block.push(format!("{prefix} {}", marker(anchor, id, "end")));

            let mut out: Vec<String> = lines[..insert_at].iter().map(|l| l.to_string()).collect();
            out.extend(block);
            out.extend(lines[insert_at..].iter().map(|l| l.to_string()));
            Ok(Injection::Inserted(join(&out, trailing, eol)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SETTINGS: &str = "class Settings:\n    # <<<inject:settings_fields>>>\n    debug: bool = False\n";

    #[test]
    fn inserts_block_after_anchor_with_indent() {
        let out = inject(SETTINGS, "settings_fields", "pg", "db_url: str = \"x\"\n", ConflictResolution::Override)
            .unwrap();
        let Injection::Inserted(text) = out else {
            panic!("expected insertion");
        };
        assert_eq!(
            text,
            "class Settings:\n    # <<<inject:settings_fields>>>\n    # <<<inject:settings_fields:pg:start>>>\n    db_url: str = \"x\"\n    # <<<inject:settings_fields:pg:end>>>\n    debug: bool = False\n"
        );
        assert!(matches!(
            find_block(&text, "settings_fields", "pg"),
            BlockState::Complete { start: 2, end: 4 }
        ));
    }

    #[test]
    fn reinjecting_same_body_is_unchanged() {
        let first = inject(SETTINGS, "settings_fields", "pg", "a = 1", ConflictResolution::Override).unwrap();
        let text = first.content().unwrap().to_string();
        let again = inject(&text, "settings_fields", "pg", "a = 1", ConflictResolution::Override).unwrap();
        assert_eq!(again, Injection::Unchanged);
    }

    #[test]
    fn override_replaces_and_merge_unions() {
        let text = inject(SETTINGS, "settings_fields", "pg", "a = 1", ConflictResolution::Override)
            .unwrap()
            .content()
            .unwrap()
            .to_string();

        let replaced = inject(&text, "settings_fields", "pg", "b = 2", ConflictResolution::Override).unwrap();
        let replaced = replaced.content().unwrap();
        assert!(replaced.contains("    b = 2") && !replaced.contains("a = 1"));

        let merged = inject(&text, "settings_fields", "pg", "b = 2", ConflictResolution::Merge).unwrap();
        let merged = merged.content().unwrap();
        assert!(merged.contains("    a = 1\n    b = 2\n"));

        let kept = inject(&text, "settings_fields", "pg", "b = 2", ConflictResolution::Skip).unwrap();
        assert_eq!(kept, Injection::Kept);
    }

    #[test]
    fn second_block_goes_after_first() {
        let text = inject(SETTINGS, "settings_fields", "a", "x = 1", ConflictResolution::Override)
            .unwrap()
            .content()
            .unwrap()
            .to_string();
        let text = inject(&text, "settings_fields", "b", "y = 2", ConflictResolution::Override)
            .unwrap()
            .content()
            .unwrap()
            .to_string();
        let x = text.find("x = 1").unwrap();
        let y = text.find("y = 2").unwrap();
        assert!(x < y);
    }

    #[test]
    fn ordered_insert_lands_above_lower_ranked_blocks() {
        let text = inject(SETTINGS, "settings_fields", "db", "db = 1", ConflictResolution::Override)
            .unwrap()
            .content()
            .unwrap()
            .to_string();
        let text = inject_ordered(&text, "settings_fields", "cache", "cache = 2", ConflictResolution::Override, |id| id == "db")
            .unwrap()
            .content()
            .unwrap()
            .to_string();
        assert!(text.find("cache = 2").unwrap() < text.find("db = 1").unwrap());
        assert!(text.contains("    # <<<inject:settings_fields:cache:end>>>\n    # <<<inject:settings_fields:db:start>>>\n"));
        assert!(text.ends_with("    debug: bool = False\n"));
    }

    #[test]
    fn crlf_files_keep_their_line_endings() {
        let host = SETTINGS.replace('\n', "\r\n");
        let out = inject(&host, "settings_fields", "pg", "a = 1\n", ConflictResolution::Override).unwrap();
        let text = out.content().unwrap();
        assert_eq!(text.matches("\r\n").count(), text.matches('\n').count());
        assert!(text.contains("    a = 1\r\n"));

        let again = inject(text, "settings_fields", "pg", "a = 1\n", ConflictResolution::Override).unwrap();
        assert_eq!(again, Injection::Unchanged);
    }

    #[test]
    fn order_key_puts_higher_priority_first() {
        assert!(order_key(10, "free/cache/redis", "r") < order_key(0, "free/database/db_postgres", "d"));
        assert!(order_key(0, "free/a", "z") < order_key(0, "free/b", "a"));
    }

    #[test]
    fn missing_anchor_and_malformed_block() {
        assert_eq!(
            inject("nothing here\n", "settings_fields", "pg", "a", ConflictResolution::Override),
            Err(InjectionFailure::AnchorMissing)
        );
        let broken = "# <<<inject:settings_fields>>>\n# <<<inject:settings_fields:pg:start>>>\na\n";
        assert_eq!(find_block(broken, "settings_fields", "pg"), BlockState::Malformed);
        assert_eq!(
            inject(broken, "settings_fields", "pg", "a", ConflictResolution::Override),
            Err(InjectionFailure::Malformed)
        );
    }

    #[test]
    fn slash_comments_are_supported() {
        let ts = "export const providers = [\n  // <<<inject:providers>>>\n];\n";
        let out = inject(ts, "providers", "redis", "RedisProvider,", ConflictResolution::Override).unwrap();
        assert!(out.content().unwrap().contains("  // <<<inject:providers:redis:start>>>\n  RedisProvider,\n"));
    }

    #[test]
    fn registry_key_uses_file_basename() {
        assert_eq!(
            SnippetRegistry::key("pg_fields", "src/app/core/settings.py"),
            "pg_fields::settings.py"
        );
    }

    #[test]
    fn catalog_rejects_colons() {
        let yaml = "snippets:\n  - id: 'a:b'\n    target: x.py\n    anchor: y\n    template: t.j2\n";
        assert!(SnippetCatalog::parse(yaml).is_err());
    }

    #[test]
    fn ordering_by_priority_then_slug() {
        let def = |id: &str, priority| SnippetDefinition {
            id: id.into(),
            target: "x".into(),
            anchor: "a".into(),
            template: "t".into(),
            owner: None,
            priority,
            version: "1.0.0".into(),
            conflict_resolution: ConflictResolution::Override,
            variants: vec![],
            context: BTreeMap::new(),
            schema: None,
        };
        let mut items = vec![
            ("free/b".to_string(), def("s1", 0)),
            ("free/a".to_string(), def("s2", 0)),
            ("free/c".to_string(), def("s3", 5)),
        ];
        items.sort_by(|a, b| injection_order((&a.0, &a.1), (&b.0, &b.1)));
        let ids: Vec<&str> = items.iter().map(|(_, d)| d.id.as_str()).collect();
        assert_eq!(ids, vec!["s3", "s2", "s1"]);
    }
}
