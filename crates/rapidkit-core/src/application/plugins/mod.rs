//! Framework plugins.
//!
//! A plugin describes one emission target (fastapi, nestjs, ...): where its
//! logical files come from and go to, what it adds to the render context,
//! and what the host machine must provide. Built-ins are registered at
//! startup; declarative plugins are loaded from YAML descriptors by the
//! adapters and registered next to them.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use crate::application::ApplicationError;
use crate::application::ports::{CommandOutcome, CommandRunner, CommandSpec, Filesystem};
use crate::domain::ecosystem::lenient_version;
use crate::domain::{Engine, RenderContext};
use crate::error::RapidkitResult;

mod builtin;
mod declarative;

pub use builtin::{FastApiPlugin, NestJsPlugin};
pub use declarative::{DeclarativePlugin, PluginDescriptor, ToolRequirement};

/// A framework variant.
pub trait FrameworkPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn language(&self) -> &str;

    fn display_name(&self) -> &str;

    fn engine(&self) -> Engine;

    /// Logical name → template path relative to a module's `templates/`.
    fn template_mappings(&self) -> &BTreeMap<String, String>;

    /// Logical name → destination relative to the project root. May contain
    /// context tokens such as `{{module_name}}`.
    fn output_paths(&self) -> &BTreeMap<String, String>;

    /// Variant-specific additions to the base context.
    fn context_enrichments(&self, base: &RenderContext) -> RenderContext;

    /// Environment problems that block generation; empty when satisfied.
    fn validate_requirements(&self, runner: &dyn CommandRunner) -> Vec<String>;

    fn pre_generation_hook(&self, _fs: &dyn Filesystem, _output_dir: &Path) -> RapidkitResult<()> {
        Ok(())
    }

    fn post_generation_hook(&self, _fs: &dyn Filesystem, _output_dir: &Path) -> RapidkitResult<()> {
        Ok(())
    }
}

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("static regex"));

/// Replace `{{ key }}` tokens in a path with string context values. Unknown
/// tokens are left in place.
pub fn expand_tokens(pattern: &str, ctx: &RenderContext) -> String {
    TOKEN
        .replace_all(pattern, |caps: &regex::Captures<'_>| match ctx.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

static VERSION_IN_OUTPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+){0,2})").expect("static regex"));

/// Run `tool args` and compare the first version number it prints with
/// `min_version`. Returns a human-readable problem, or `None` when satisfied.
pub fn check_tool_version(
    runner: &dyn CommandRunner,
    tool: &str,
    args: &[&str],
    min_version: &str,
) -> Option<String> {
    let spec = CommandSpec::new(tool, args, std::time::Duration::from_secs(30));
    match runner.run(&spec) {
        CommandOutcome::NotFound => Some(format!("{tool} is not installed (need >= {min_version})")),
        CommandOutcome::TimedOut => Some(format!("'{}' timed out", spec.display())),
        CommandOutcome::Completed {
            success: false,
            stderr,
            ..
        } => Some(format!("'{}' failed: {}", spec.display(), stderr.trim())),
        CommandOutcome::Completed { stdout, stderr, .. } => {
            let text = format!("{stdout}\n{stderr}");
            let found = VERSION_IN_OUTPUT
                .captures(&text)
                .and_then(|c| lenient_version(&c[1]));
            let wanted = lenient_version(min_version);
            debug!(tool, ?found, ?wanted, "Checked tool version");
            match (found, wanted) {
                (Some(found), Some(wanted)) if found >= wanted => None,
                (Some(found), Some(_)) => {
                    Some(format!("{tool} {found} is too old (need >= {min_version})"))
                }
                _ => Some(format!("cannot determine {tool} version from '{}'", text.trim())),
            }
        }
    }
}

/// Registered framework plugins, keyed by name.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn FrameworkPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `fastapi` and `nestjs` plugins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .plugins
            .insert("fastapi".into(), Arc::new(FastApiPlugin::new()));
        registry
            .plugins
            .insert("nestjs".into(), Arc::new(NestJsPlugin::new()));
        registry
    }

    pub fn register(&mut self, plugin: Arc<dyn FrameworkPlugin>) -> Result<(), ApplicationError> {
        let name = plugin.name().to_string();
        if self.plugins.contains_key(&name) {
            return Err(ApplicationError::DuplicatePlugin { name });
        }
        debug!(plugin = %name, "Registered framework plugin");
        self.plugins.insert(name, plugin);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn FrameworkPlugin>, ApplicationError> {
        self.plugins
            .get(name)
            .cloned()
            .ok_or_else(|| ApplicationError::UnknownFramework {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
