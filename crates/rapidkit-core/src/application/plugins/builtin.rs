use std::collections::BTreeMap;

use crate::application::ports::CommandRunner;
use crate::domain::naming::{to_camel, to_kebab, to_pascal, to_snake};
use crate::domain::{Engine, RenderContext};

use super::{FrameworkPlugin, check_tool_version};

fn mappings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn module_name(base: &RenderContext) -> String {
    base.get_str("module_name").unwrap_or_default().to_string()
}

fn vendor_path(base: &RenderContext) -> String {
    base.get_str("vendor_relative_path")
        .unwrap_or_default()
        .to_string()
}

/// FastAPI on Python >= 3.10.
pub struct FastApiPlugin {
    templates: BTreeMap<String, String>,
    outputs: BTreeMap<String, String>,
}

impl FastApiPlugin {
    pub const MIN_PYTHON: &'static str = "3.10";

    pub fn new() -> Self {
        Self {
            templates: mappings(&[
                ("service", "variants/fastapi/{{module_name}}.py.j2"),
                ("routes", "variants/fastapi/{{module_name}}_routes.py.j2"),
                ("health", "variants/fastapi/{{module_name}}_health.py.j2"),
                ("config", "variants/fastapi/{{module_name}}_config.yaml.j2"),
                ("tests", "tests/fastapi/test_{{module_name}}.py.j2"),
            ]),
            outputs: mappings(&[
                ("service", "src/modules/{{module_name}}/{{module_name}}.py"),
                ("routes", "src/modules/{{module_name}}/routers/{{module_name}}.py"),
                ("health", "src/health/{{module_name}}.py"),
                ("config", "config/{{module_name}}.yaml"),
                ("tests", "tests/modules/test_{{module_name}}.py"),
            ]),
        }
    }
}

impl Default for FastApiPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkPlugin for FastApiPlugin {
    fn name(&self) -> &str {
        "fastapi"
    }

    fn language(&self) -> &str {
        "python"
    }

    fn display_name(&self) -> &str {
        "FastAPI"
    }

    fn engine(&self) -> Engine {
        Engine::Python
    }

    fn template_mappings(&self) -> &BTreeMap<String, String> {
        &self.templates
    }

    fn output_paths(&self) -> &BTreeMap<String, String> {
        &self.outputs
    }

    fn context_enrichments(&self, base: &RenderContext) -> RenderContext {
        let name = module_name(base);
        let vendor = vendor_path(base);
        RenderContext::new()
            .with("framework", "fastapi")
            .with("language", "python")
            .with("module_kebab", to_kebab(&name))
            .with("module_snake", to_snake(&name))
            .with("module_import_path", format!("src.modules.{}", to_snake(&name)))
            .with(
                "vendor_configuration_relative",
                format!("{vendor}/configuration.py"),
            )
    }

    fn validate_requirements(&self, runner: &dyn CommandRunner) -> Vec<String> {
        check_tool_version(runner, "python3", &["--version"], Self::MIN_PYTHON)
            .into_iter()
            .collect()
    }
}

/// NestJS on Node >= 20.
pub struct NestJsPlugin {
    templates: BTreeMap<String, String>,
    outputs: BTreeMap<String, String>,
}

impl NestJsPlugin {
    pub const MIN_NODE: &'static str = "20";

    pub fn new() -> Self {
        Self {
            templates: mappings(&[
                ("service", "variants/nestjs/{{module_name}}.service.ts.j2"),
                ("module", "variants/nestjs/{{module_name}}.module.ts.j2"),
                ("controller", "variants/nestjs/{{module_name}}.controller.ts.j2"),
                ("health", "variants/nestjs/{{module_name}}.health.ts.j2"),
                ("config", "variants/nestjs/{{module_name}}.config.ts.j2"),
            ]),
            outputs: mappings(&[
                ("service", "src/modules/{{module_kebab}}/{{module_kebab}}.service.ts"),
                ("module", "src/modules/{{module_kebab}}/{{module_kebab}}.module.ts"),
                (
                    "controller",
                    "src/modules/{{module_kebab}}/{{module_kebab}}.controller.ts",
                ),
                ("health", "src/health/{{module_kebab}}.health.ts"),
                ("config", "src/config/{{module_kebab}}.config.ts"),
            ]),
        }
    }
}

impl Default for NestJsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkPlugin for NestJsPlugin {
    fn name(&self) -> &str {
        "nestjs"
    }

    fn language(&self) -> &str {
        "typescript"
    }

    fn display_name(&self) -> &str {
        "NestJS"
    }

    fn engine(&self) -> Engine {
        Engine::Npm
    }

    fn template_mappings(&self) -> &BTreeMap<String, String> {
        &self.templates
    }

    fn output_paths(&self) -> &BTreeMap<String, String> {
        &self.outputs
    }

    fn context_enrichments(&self, base: &RenderContext) -> RenderContext {
        let name = module_name(base);
        let vendor = vendor_path(base);
        RenderContext::new()
            .with("framework", "nestjs")
            .with("language", "typescript")
            .with("module_kebab", to_kebab(&name))
            .with("module_camel", to_camel(&name))
            .with("module_pascal", to_pascal(&name))
            .with("nest_module_class", format!("{}Module", to_pascal(&name)))
            .with(
                "vendor_configuration_relative",
                format!("{vendor}/configuration.ts"),
            )
    }

    fn validate_requirements(&self, runner: &dyn CommandRunner) -> Vec<String> {
        check_tool_version(runner, "node", &["--version"], Self::MIN_NODE)
            .into_iter()
            .collect()
    }
}
