use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::application::ports::{CommandRunner, Filesystem};
use crate::domain::{ContextValue, Engine, RenderContext};
use crate::error::RapidkitResult;

use super::{FrameworkPlugin, check_tool_version, expand_tokens};

/// A host tool a plugin needs, e.g. `{tool: go, args: [version], min_version: "1.22"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequirement {
    pub tool: String,
    #[serde(default = "default_version_args")]
    pub args: Vec<String>,
    pub min_version: String,
}

fn default_version_args() -> Vec<String> {
    vec!["--version".into()]
}

/// YAML descriptor for a plugin that needs no code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub engine: Engine,
    #[serde(default)]
    pub template_mappings: BTreeMap<String, String>,
    #[serde(default)]
    pub output_paths: BTreeMap<String, String>,
    /// Static additions; string values may use `{{ key }}` tokens from the
    /// base context.
    #[serde(default)]
    pub context: BTreeMap<String, ContextValue>,
    #[serde(default)]
    pub requirements: Vec<ToolRequirement>,
    /// Directories created before generation, relative to the project.
    #[serde(default)]
    pub ensure_directories: Vec<String>,
}

impl PluginDescriptor {
    /// Structural problems with the descriptor, empty when usable.
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.name.trim().is_empty() {
            out.push("'name' is empty".to_string());
        }
        for logical in self.template_mappings.keys() {
            if !self.output_paths.contains_key(logical) {
                out.push(format!("logical name '{logical}' has a template but no output path"));
            }
        }
        out
    }
}

pub struct DeclarativePlugin {
    descriptor: PluginDescriptor,
}

impl DeclarativePlugin {
    pub fn new(descriptor: PluginDescriptor) -> Self {
        Self { descriptor }
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }
}

impl FrameworkPlugin for DeclarativePlugin {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn language(&self) -> &str {
        &self.descriptor.language
    }

    fn display_name(&self) -> &str {
        self.descriptor
            .display_name
            .as_deref()
            .unwrap_or(&self.descriptor.name)
    }

    fn engine(&self) -> Engine {
        self.descriptor.engine
    }

    fn template_mappings(&self) -> &BTreeMap<String, String> {
        &self.descriptor.template_mappings
    }

    fn output_paths(&self) -> &BTreeMap<String, String> {
        &self.descriptor.output_paths
    }

    fn context_enrichments(&self, base: &RenderContext) -> RenderContext {
        let mut out = RenderContext::new().with("framework", self.descriptor.name.as_str());
        for (key, value) in &self.descriptor.context {
            let value = match value {
                ContextValue::String(s) => ContextValue::String(expand_tokens(s, base)),
                other => other.clone(),
            };
            out.insert(key.clone(), value);
        }
        out
    }

    fn validate_requirements(&self, runner: &dyn CommandRunner) -> Vec<String> {
        self.descriptor
            .requirements
            .iter()
            .filter_map(|req| {
                let args: Vec<&str> = req.args.iter().map(String::as_str).collect();
                check_tool_version(runner, &req.tool, &args, &req.min_version)
            })
            .collect()
    }

    fn pre_generation_hook(&self, fs: &dyn Filesystem, output_dir: &Path) -> RapidkitResult<()> {
        for dir in &self.descriptor.ensure_directories {
            fs.create_dir_all(&output_dir.join(dir))?;
        }
        Ok(())
    }
}
