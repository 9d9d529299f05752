//! Tera-backed renderer.

use std::collections::{HashMap, HashSet};
use std::error::Error as _;
use std::sync::LazyLock;

use regex::Regex;
use tera::{Context, Tera, Value};
use tracing::{debug, instrument};

use rapidkit_core::{
    application::{ApplicationError, ports::TemplateRenderer},
    domain::{RenderContext, naming},
    error::RapidkitResult,
};

use super::{target_name, wants_autoescape};

static UNDEFINED_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Variable `([^`]+)` not found in context").expect("static regex")
});

static CONDITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{%-?\s*(?:el)?if\s+(?:not\s+)?([A-Za-z_][A-Za-z0-9_]*)([^%]*)-?%\}")
        .expect("static regex")
});

static BINDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\{%-?\s*set(?:_global)?\s+([A-Za-z_][A-Za-z0-9_]*)",
        r"|\{%-?\s*for\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s*,\s*([A-Za-z_][A-Za-z0-9_]*))?\s+in\b",
        r"|\{%-?\s*macro\s+[A-Za-z_][A-Za-z0-9_]*\s*\(([^)]*)\)",
    ))
    .expect("static regex")
});

static TESTED_OR_FILTERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:is\b|\|)").expect("static regex"));

/// Strict Tera renderer: undefined variables are errors, including a bare
/// undefined name at the head of an `if`/`elif` condition, which Tera on
/// its own evaluates as false. Conditions written as `x is defined` or
/// piped through a filter such as `default` are left to Tera.
#[derive(Debug, Default, Clone, Copy)]
pub struct TeraRenderer;

impl TeraRenderer {
    pub fn new() -> Self {
        Self
    }

    fn engine(name: &str) -> Tera {
        let mut tera = Tera::default();
        if wants_autoescape(name) {
            tera.autoescape_on(vec![""]);
        } else {
            tera.autoescape_on(Vec::new());
        }
        tera.register_filter("kebab", case_filter(naming::to_kebab));
        tera.register_filter("snake", case_filter(naming::to_snake));
        tera.register_filter("pascal", case_filter(naming::to_pascal));
        tera.register_filter("camel", case_filter(naming::to_camel));
        tera
    }
}

fn case_filter(
    convert: fn(&str) -> String,
) -> impl Fn(&Value, &HashMap<String, Value>) -> tera::Result<Value> + Send + Sync {
    move |value, _args| match value {
        Value::String(s) => Ok(Value::String(convert(s))),
        other => Ok(Value::String(convert(&other.to_string()))),
    }
}

/// First `if`/`elif` whose leading name is neither in `context` nor bound
/// by the template itself (`set`, `for`, macro arguments).
fn undefined_condition(source: &str, context: &RenderContext) -> Option<String> {
    let mut bound: HashSet<&str> = HashSet::from(["loop", "true", "false", "True", "False"]);
    for caps in BINDING.captures_iter(source) {
        bound.extend([caps.get(1), caps.get(2), caps.get(3)].into_iter().flatten().map(|m| m.as_str()));
        if let Some(args) = caps.get(4) {
            bound.extend(
                args.as_str()
                    .split(',')
                    .filter_map(|arg| arg.split('=').next())
                    .map(str::trim)
                    .filter(|arg| !arg.is_empty()),
            );
        }
    }
    CONDITION.captures_iter(source).find_map(|caps| {
        let name = caps.get(1)?.as_str();
        let rest = caps.get(2).map_or("", |m| m.as_str());
        let undefined = !TESTED_OR_FILTERED.is_match(rest)
            && !bound.contains(name)
            && !context.contains(name);
        undefined.then(|| name.to_string())
    })
}

/// Full message chain of a Tera error.
fn describe(error: &tera::Error) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

impl TemplateRenderer for TeraRenderer {
    #[instrument(skip(self, source, context), fields(template = %name))]
    fn render(&self, name: &str, source: &str, context: &RenderContext) -> RapidkitResult<String> {
        let mut tera = Self::engine(name);
        let template = target_name(name);
        tera.add_raw_template(template, source)
            .map_err(|e| ApplicationError::RenderingFailed {
                template: name.to_string(),
                reason: describe(&e),
            })?;
        if let Some(variable) = undefined_condition(source, context) {
            debug!(%variable, "Condition names an undefined variable");
            return Err(ApplicationError::UndefinedVariable {
                template: name.to_string(),
                variable,
            }
            .into());
        }
        let ctx = Context::from_serialize(context).map_err(|e| {
            ApplicationError::RenderingFailed {
                template: name.to_string(),
                reason: describe(&e),
            }
        })?;

        tera.render(template, &ctx).map_err(|e| {
            let reason = describe(&e);
            debug!(%reason, "Template failed to render");
            match UNDEFINED_VARIABLE.captures(&reason) {
                Some(caps) => ApplicationError::UndefinedVariable {
                    template: name.to_string(),
                    variable: caps[1].to_string(),
                },
                None => ApplicationError::RenderingFailed {
                    template: name.to_string(),
                    reason,
                },
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rapidkit_core::error::RapidkitError;

    fn ctx() -> RenderContext {
        RenderContext::new()
            .with("module_name", "db_postgres")
            .with("title", "<b>Hi</b>")
            .with("enabled", true)
    }

    #[test]
    fn renders_control_blocks_and_case_filters() {
        let source = "{% if enabled %}class {{ module_name|pascal }}: {{ module_name|kebab }}{% endif %}";
        let out = TeraRenderer::new().render("src/x.py.j2", source, &ctx()).unwrap();
        assert_eq!(out, "class DbPostgres: db-postgres");
    }

    #[test]
    fn undefined_variables_are_reported_by_name() {
        let err = TeraRenderer::new()
            .render("src/x.py.j2", "{{ missing_value }}", &ctx())
            .unwrap_err();
        match err {
            RapidkitError::Application(ApplicationError::UndefinedVariable {
                template,
                variable,
            }) => {
                assert_eq!(template, "src/x.py.j2");
                assert_eq!(variable, "missing_value");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn undefined_name_in_a_condition_is_an_error() {
        let renderer = TeraRenderer::new();
        let err = renderer
            .render("src/x.py.j2", "{% if ctx.enabled %}a{% elif feature_flag %}b{% endif %}", &ctx())
            .unwrap_err();
        assert!(matches!(
            err,
            RapidkitError::Application(ApplicationError::UndefinedVariable { ref variable, .. })
                if variable == "ctx"
        ));

        let guarded = "{% if feature_flag is defined %}on{% endif %}\
            {% if other | default(value=false) %}x{% endif %}\
            {% for item in [1] %}{% if item %}.{% endif %}{% endfor %}\
            {% set local = true %}{% if not local %}!{% endif %}";
        assert_eq!(renderer.render("src/x.py.j2", guarded, &ctx()).unwrap(), ".");
    }

    #[test]
    fn escapes_only_markup_targets() {
        let renderer = TeraRenderer::new();
        let html = renderer.render("index.html.j2", "{{ title }}", &ctx()).unwrap();
        let code = renderer.render("main.py.j2", "{{ title }}", &ctx()).unwrap();
        assert_eq!(html, "&lt;b&gt;Hi&lt;&#x2F;b&gt;");
        assert_eq!(code, "<b>Hi</b>");
    }

    #[test]
    fn syntax_errors_are_rendering_failures() {
        let err = TeraRenderer::new()
            .render("a.py", "{% if %}", &ctx())
            .unwrap_err();
        assert!(matches!(
            err,
            RapidkitError::Application(ApplicationError::RenderingFailed { .. })
        ));
    }
}
