//! Template renderer adapters.
//!
//! [`TeraRenderer`] is the primary engine. [`SimpleRenderer`] only does
//! `{{ var }}` substitution and backs [`FallbackRenderer`] when the
//! configuration allows it.

mod fallback;
mod simple;
mod tera;

pub use fallback::FallbackRenderer;
pub use simple::SimpleRenderer;
pub use tera::TeraRenderer;

/// Output target with a trailing `.j2`/`.tera` removed.
pub(crate) fn target_name(name: &str) -> &str {
    name.strip_suffix(".j2")
        .or_else(|| name.strip_suffix(".tera"))
        .unwrap_or(name)
}

/// Whether output written to `name` should be HTML-escaped.
pub(crate) fn wants_autoescape(name: &str) -> bool {
    let target = target_name(name).to_ascii_lowercase();
    [".html", ".htm", ".xml"]
        .iter()
        .any(|ext| target.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autoescape_follows_the_output_extension() {
        assert!(wants_autoescape("templates/index.html.j2"));
        assert!(wants_autoescape("sitemap.XML"));
        assert!(!wants_autoescape("src/settings.py.j2"));
        assert!(!wants_autoescape("page.html.py"));
    }
}
