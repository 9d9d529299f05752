//! Filesystem-based module catalog.
//!
//! # Directory layout expected
//!
//! ```text
//! modules/
//! └── free/
//!     └── essentials/
//!         └── settings/
//!             ├── module.yaml      ← manifest (required)
//!             ├── overrides.yaml   ← declarative overrides (optional)
//!             ├── snippets.yaml    ← snippet catalog (optional, named in module.yaml)
//!             └── templates/
//!                 ├── vendor/...
//!                 └── variants/fastapi/settings.py.j2
//! ```
//!
//! A slug is the module directory relative to the catalog root, with `/`
//! separators. Discovery does not descend into `templates/` or hidden
//! directories.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use rapidkit_core::{
    application::{ApplicationError, ports::ModuleSource},
    domain::{
        DomainError, ModuleManifest, OverrideSpec, ProjectPath, SnippetCatalog, validate_slug,
    },
    error::{RapidkitError, RapidkitResult},
};

use super::{is_hidden, join_slash, read_optional, relative_slash};

pub const MANIFEST_FILE: &str = "module.yaml";
pub const OVERRIDES_FILE: &str = "overrides.yaml";
pub const TEMPLATES_DIR: &str = "templates";

/// Module catalog rooted at `modules_root`.
#[derive(Debug, Clone)]
pub struct FsModuleCatalog {
    modules_root: PathBuf,
}

impl FsModuleCatalog {
    /// The directory does not need to exist yet; [`ModuleSource::discover`]
    /// fails if it is missing when called.
    pub fn new(modules_root: impl Into<PathBuf>) -> Self {
        Self {
            modules_root: modules_root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.modules_root
    }

    /// Module directory for `slug`, refusing slugs that escape the root.
    fn module_dir(&self, slug: &str) -> RapidkitResult<PathBuf> {
        validate_slug(slug)?;
        Ok(join_slash(&self.modules_root, slug))
    }

    fn read_document(&self, slug: &str, relative: &str) -> RapidkitResult<Option<String>> {
        let relative = ProjectPath::try_new(relative)?;
        let path = relative.to_fs(&self.module_dir(slug)?);
        Ok(read_optional(&path)?)
    }
}

impl ModuleSource for FsModuleCatalog {
    #[instrument(skip(self), fields(root = %self.modules_root.display()))]
    fn discover(&self) -> RapidkitResult<Vec<String>> {
        if !self.modules_root.is_dir() {
            return Err(RapidkitError::Configuration {
                message: format!(
                    "modules root not found: {}",
                    self.modules_root.display()
                ),
            });
        }

        let walker = WalkDir::new(&self.modules_root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                entry.depth() == 0
                    || !(entry.file_type().is_dir() && (is_hidden(&name) || name == TEMPLATES_DIR))
            });

        let mut slugs = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable catalog entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || entry.file_name() != MANIFEST_FILE {
                continue;
            }
            let Some(dir) = entry.path().parent() else {
                continue;
            };
            match relative_slash(&self.modules_root, dir) {
                Some(slug) => slugs.push(slug),
                None => warn!(path = %entry.path().display(), "Manifest at catalog root ignored"),
            }
        }
        slugs.sort();
        debug!(count = slugs.len(), "Discovered modules");
        Ok(slugs)
    }

    fn load_manifest(&self, slug: &str) -> RapidkitResult<ModuleManifest> {
        let path = self.module_dir(slug)?.join(MANIFEST_FILE);
        let raw = read_optional(&path)?.ok_or_else(|| ApplicationError::ModuleNotFound {
            slug: slug.to_string(),
        })?;
        ModuleManifest::parse(slug, &raw)
            .map_err(|e| RapidkitError::Domain(DomainError::Manifest(e)))
    }

    fn read_template(&self, slug: &str, template: &str) -> RapidkitResult<String> {
        let relative = ProjectPath::try_new(template)?;
        let path = relative.to_fs(&self.module_dir(slug)?.join(TEMPLATES_DIR));
        read_optional(&path)?.ok_or_else(|| {
            ApplicationError::TemplateNotFound {
                module: slug.to_string(),
                template: template.to_string(),
            }
            .into()
        })
    }

    fn load_overrides(&self, slug: &str) -> RapidkitResult<Option<OverrideSpec>> {
        match self.read_document(slug, OVERRIDES_FILE)? {
            Some(raw) => Ok(Some(OverrideSpec::parse(&raw)?)),
            None => Ok(None),
        }
    }

    fn load_snippets(&self, slug: &str, config: &str) -> RapidkitResult<SnippetCatalog> {
        let raw = self.read_document(slug, config)?.ok_or_else(|| {
            ApplicationError::filesystem(
                join_slash(&self.modules_root, slug).join(config),
                "snippet catalog not found",
            )
        })?;
        Ok(SnippetCatalog::parse(&raw)?)
    }

    fn module_path(&self, slug: &str) -> PathBuf {
        join_slash(&self.modules_root, slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn manifest(slug: &str) -> String {
        format!("name: {slug}\nversion: 1.2.0\ntier: free\n")
    }

    #[test]
    fn discovers_nested_slugs_in_order() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "free/essentials/settings/module.yaml", &manifest("free/essentials/settings"));
        write(root, "free/database/db_postgres/module.yaml", &manifest("free/database/db_postgres"));
        write(root, "free/database/db_postgres/templates/module.yaml", "ignored");
        write(root, ".git/module.yaml", "ignored");

        let slugs = FsModuleCatalog::new(root).discover().unwrap();
        assert_eq!(slugs, vec!["free/database/db_postgres", "free/essentials/settings"]);
    }

    #[test]
    fn missing_root_is_a_configuration_error() {
        let temp = TempDir::new().unwrap();
        let err = FsModuleCatalog::new(temp.path().join("nope")).discover().unwrap_err();
        assert!(matches!(err, RapidkitError::Configuration { .. }));
    }

    #[test]
    fn loads_manifest_templates_and_overrides() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let slug = "free/essentials/settings";
        write(root, &format!("{slug}/module.yaml"), &manifest(slug));
        write(root, &format!("{slug}/templates/base.py.j2"), "x = {{ x }}");
        write(
            root,
            &format!("{slug}/overrides.yaml"),
            "overrides:\n  - key: debug\n    type: bool\n",
        );

        let catalog = FsModuleCatalog::new(root);
        assert_eq!(catalog.load_manifest(slug).unwrap().version.to_string(), "1.2.0");
        assert_eq!(catalog.read_template(slug, "base.py.j2").unwrap(), "x = {{ x }}");
        assert!(catalog.load_overrides(slug).unwrap().is_some());
        assert!(matches!(
            catalog.read_template(slug, "missing.j2").unwrap_err(),
            RapidkitError::Application(ApplicationError::TemplateNotFound { .. })
        ));
    }

    #[test]
    fn template_paths_cannot_escape_the_module() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "free/a/b/module.yaml", &manifest("free/a/b"));
        let catalog = FsModuleCatalog::new(temp.path());
        assert!(catalog.read_template("free/a/b", "../module.yaml").is_err());
    }

    #[test]
    fn unknown_module_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = FsModuleCatalog::new(temp.path())
            .load_manifest("free/none/here")
            .unwrap_err();
        assert!(matches!(
            err,
            RapidkitError::Application(ApplicationError::ModuleNotFound { .. })
        ));
    }
}
