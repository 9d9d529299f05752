//! Module structure validator.
//!
//! Lists a module directory through the [`Filesystem`] port (minus ignored
//! entries and the verification file itself), checks it against the
//! blueprint and refreshes the module's verification file. The file is only
//! rewritten when the outcome or tree hash changed, so repeated runs leave
//! it byte-identical.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::Pattern;
use tracing::{debug, instrument, warn};

use rapidkit_core::{
    application::{
        ApplicationError,
        ports::{Clock, Filesystem, ModuleValidator},
    },
    domain::{
        ModuleListing, ModuleManifest, StructureBlueprint, ValidationResult, VerificationRecord,
        structure,
    },
    error::RapidkitResult,
};

use crate::catalog::{join_slash, relative_slash};

pub struct StructureValidator {
    modules_root: PathBuf,
    blueprint: StructureBlueprint,
    ignore: Vec<Pattern>,
    fs: Arc<dyn Filesystem>,
    clock: Arc<dyn Clock>,
}

impl StructureValidator {
    pub fn new(
        modules_root: impl Into<PathBuf>,
        blueprint: StructureBlueprint,
        fs: Arc<dyn Filesystem>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ignore = blueprint
            .ignore_patterns
            .iter()
            .filter_map(|raw| match Pattern::new(raw) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %raw, error = %e, "Ignoring invalid ignore pattern");
                    None
                }
            })
            .collect();
        Self {
            modules_root: modules_root.into(),
            blueprint,
            ignore,
            fs,
            clock,
        }
    }

    /// Load the blueprint from `path` when it exists, else use the default.
    pub fn from_blueprint_file(
        modules_root: impl Into<PathBuf>,
        path: Option<&Path>,
        fs: Arc<dyn Filesystem>,
        clock: Arc<dyn Clock>,
    ) -> RapidkitResult<Self> {
        let blueprint = match path {
            Some(path) => match fs.read_file(path)? {
                Some(raw) => StructureBlueprint::parse(&raw)?,
                None => StructureBlueprint::default(),
            },
            None => StructureBlueprint::default(),
        };
        Ok(Self::new(modules_root, blueprint, fs, clock))
    }

    /// A directory is ignored when a pattern like `**/name/**` covers its
    /// contents.
    fn ignored(&self, relative: &str, is_dir: bool) -> bool {
        let child = format!("{relative}/_");
        self.ignore
            .iter()
            .any(|p| p.matches(relative) || (is_dir && p.matches(&child)))
    }

    fn listing(&self, module_dir: &Path) -> RapidkitResult<ModuleListing> {
        let mut listing = ModuleListing::default();
        let mut pending = vec![module_dir.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for path in self.fs.list_dir(&dir)? {
                let Some(rel) = relative_slash(module_dir, &path) else {
                    continue;
                };
                let is_dir = self.fs.is_dir(&path);
                if self.ignored(&rel, is_dir) {
                    continue;
                }
                if is_dir {
                    listing.directories.insert(rel);
                    pending.push(path);
                } else if rel != self.blueprint.verification_file {
                    listing.files.insert(rel);
                }
            }
        }
        Ok(listing)
    }

    fn refresh_verification(&self, module_dir: &Path, result: &ValidationResult) -> RapidkitResult<()> {
        let path = join_slash(module_dir, &result.verification_file);
        let previous = match self.fs.read_file(&path)? {
            Some(raw) => serde_json::from_str::<VerificationRecord>(&raw).ok(),
            None => None,
        };
        let (record, changed) = VerificationRecord::refresh(previous, result, self.clock.now());
        if changed {
            let json = serde_json::to_string_pretty(&record)
                .map_err(|e| ApplicationError::serialization(&result.verification_file, e))?;
            self.fs.write_file(&path, &format!("{json}\n"))?;
            debug!(path = %path.display(), "Verification file updated");
        }
        Ok(())
    }
}

impl ModuleValidator for StructureValidator {
    #[instrument(skip(self, manifest))]
    fn validate<'a>(
        &self,
        slug: &str,
        manifest: Option<&'a ModuleManifest>,
    ) -> RapidkitResult<ValidationResult> {
        let module_dir = join_slash(&self.modules_root, slug);
        if !self.fs.is_dir(&module_dir) {
            return Err(ApplicationError::ModuleNotFound {
                slug: slug.to_string(),
            }
            .into());
        }
        let listing = self.listing(&module_dir)?;
        let templates = module_dir.join("templates");
        let read_template =
            |rel: &str| self.fs.read_file(&join_slash(&templates, rel)).ok().flatten();
        let result = structure::evaluate(
            &self.blueprint,
            slug,
            &module_dir.to_string_lossy(),
            &listing,
            manifest,
            &read_template,
        );
        self.refresh_verification(&module_dir, &result)?;
        Ok(result)
    }
}
