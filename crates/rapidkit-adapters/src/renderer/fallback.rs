//! Primary renderer with an opt-in trivial fallback.

use tracing::warn;

use rapidkit_core::{
    application::{ApplicationError, ports::TemplateRenderer},
    domain::RenderContext,
    error::{RapidkitError, RapidkitResult},
};

use super::SimpleRenderer;

/// Tries `primary` first. When it fails for any reason other than an
/// undefined variable, the template is retried with [`SimpleRenderer`].
pub struct FallbackRenderer {
    primary: Box<dyn TemplateRenderer>,
    fallback: SimpleRenderer,
}

impl FallbackRenderer {
    pub fn new(primary: Box<dyn TemplateRenderer>) -> Self {
        Self {
            primary,
            fallback: SimpleRenderer::new(),
        }
    }
}

impl TemplateRenderer for FallbackRenderer {
    fn render(&self, name: &str, source: &str, context: &RenderContext) -> RapidkitResult<String> {
        match self.primary.render(name, source, context) {
            Ok(out) => Ok(out),
            Err(e @ RapidkitError::Application(ApplicationError::UndefinedVariable { .. })) => {
                Err(e)
            }
            Err(primary_error) => {
                warn!(template = %name, error = %primary_error, "Falling back to simple renderer");
                self.fallback.render(name, source, context)
            }
        }
    }
}
