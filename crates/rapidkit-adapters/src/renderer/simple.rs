//! Trivial `{{ var }}` substitution renderer.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::instrument;

use rapidkit_core::{
    application::{ApplicationError, ports::TemplateRenderer},
    domain::{RenderContext, naming},
    error::RapidkitResult,
};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?:\|\s*([A-Za-z_]+)\s*)?\}\}")
        .expect("static regex")
});

/// Renderer for environments without a template engine.
///
/// Supports `{{ var }}` and `{{ var|filter }}` with the case filters plus
/// `lower` and `upper`. Templates containing `{%` or `{#` are refused.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleRenderer;

impl SimpleRenderer {
    /// Create a new simple renderer.
    pub fn new() -> Self {
        Self
    }
}

fn apply_filter(filter: &str, value: &str) -> Option<String> {
    Some(match filter {
        "lower" => value.to_lowercase(),
        "upper" => value.to_uppercase(),
        "kebab" => naming::to_kebab(value),
        "snake" => naming::to_snake(value),
        "pascal" => naming::to_pascal(value),
        "camel" => naming::to_camel(value),
        _ => return None,
    })
}

impl TemplateRenderer for SimpleRenderer {
    #[instrument(skip(self, source, context), fields(template = %name))]
    fn render(&self, name: &str, source: &str, context: &RenderContext) -> RapidkitResult<String> {
        if source.contains("{%") || source.contains("{#") {
            return Err(ApplicationError::RenderingFailed {
                template: name.to_string(),
                reason: "control blocks need the full template engine".into(),
            }
            .into());
        }

        let mut failure: Option<ApplicationError> = None;
        let rendered = PLACEHOLDER.replace_all(source, |caps: &Captures<'_>| {
            if failure.is_some() {
                return String::new();
            }
            let variable = &caps[1];
            let Some(value) = context.get(variable) else {
                failure = Some(ApplicationError::UndefinedVariable {
                    template: name.to_string(),
                    variable: variable.to_string(),
                });
                return String::new();
            };
            let value = value.to_string();
            match caps.get(2) {
                None => value,
                Some(filter) => apply_filter(filter.as_str(), &value).unwrap_or_else(|| {
                    failure = Some(ApplicationError::RenderingFailed {
                        template: name.to_string(),
                        reason: format!("unknown filter '{}'", filter.as_str()),
                    });
                    String::new()
                }),
            }
        });

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(rendered.into_owned()),
        }
    }
}
