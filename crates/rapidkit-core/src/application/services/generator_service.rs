//! Module generator.
//!
//! Renders one module for the project's variant and commits it:
//!
//! 1. Load the manifest and build the base context (computed keys, module
//!    defaults, project variables, declarative overrides, plugin
//!    enrichments, explicit variables).
//! 2. Check the plugin's host requirements and run its pre-generation hook.
//! 3. Render the vendor payload, then the variant files in declared order.
//! 4. Stage files whose status allows a write; skip and report the rest.
//! 5. Place the module's snippets.
//! 6. Commit files and registries, then merge package dependencies.
//! 7. Run the post-generation hook; failures only warn.
//!
//! Rendering happens entirely before the first write, so a missing template
//! or undefined variable leaves the project untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::application::ApplicationError;
use crate::application::plugins::{FrameworkPlugin, PluginRegistry, expand_tokens};
use crate::application::ports::Ports;
use crate::application::services::dependency_service::{
    DependencyOutcome, merge_module_dependencies,
};
use crate::application::services::hash_service::file_state;
use crate::application::services::snippet_service::{InjectionRequest, SnippetEngine};
use crate::application::state::ProjectState;
use crate::domain::naming::to_pascal;
use crate::domain::snippet::injection_order;
use crate::domain::{
    ArtifactKind, FileStatus, ModuleManifest, ProjectPath, RenderContext, SnippetStatus,
    StagedChanges, StagedFile, VariantFile,
};
use crate::error::RapidkitResult;

/// Prefix of environment variables handed to the override layer.
pub const OVERRIDE_ENV_PREFIX: &str = "RAPIDKIT_";

/// Knobs the caller injects into the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorSettings {
    pub check_requirements: bool,
    /// `RAPIDKIT_*` variables visible to declarative overrides.
    pub env: BTreeMap<String, String>,
    /// Shared vendor cache outside the project (`RAPIDKIT_VENDOR_ROOT`).
    pub vendor_cache: Option<PathBuf>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            check_requirements: true,
            env: BTreeMap::new(),
            vendor_cache: None,
        }
    }
}

impl GeneratorSettings {
    /// Keep only `RAPIDKIT_*` pairs from an environment listing.
    pub fn with_env<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env = vars
            .into_iter()
            .filter(|(k, _)| k.starts_with(OVERRIDE_ENV_PREFIX))
            .collect();
        self
    }
}

/// Which runtimes the host project carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostKind {
    Python,
    Node,
    Mixed,
}

impl HostKind {
    fn from_hint(hint: &str) -> Option<Self> {
        match hint.trim().to_ascii_lowercase().as_str() {
            "fastapi" | "python" | "django" | "flask" => Some(Self::Python),
            "nestjs" | "node" | "express" | "typescript" => Some(Self::Node),
            _ => None,
        }
    }

    /// Whether a vendor file at `relative` belongs on this host.
    pub fn accepts_vendor_file(&self, relative: &str) -> bool {
        let in_dir = |dir: &str| relative.split('/').any(|seg| seg == dir);
        match self {
            Self::Mixed => true,
            Self::Python => {
                !(in_dir("nestjs") || relative.ends_with(".ts") || relative.ends_with(".js"))
            }
            Self::Node => !(in_dir("fastapi") || relative.ends_with(".py")),
        }
    }
}

/// Where vendor payloads go. Cache roots are shared across projects, are
/// never host-filtered and are not hash-tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
enum VendorRoot {
    Project(String),
    Cache(PathBuf),
}

/// A rendered file with its project-relative destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: ProjectPath,
    pub content: String,
    pub kind: ArtifactKind,
}

/// Everything one module renders to, before any write.
#[derive(Debug, Clone)]
pub struct RenderedModule {
    pub manifest: ModuleManifest,
    pub variant: String,
    pub context: RenderContext,
    /// Vendor files first, then variant files in declared order.
    pub files: Vec<RenderedFile>,
    /// Vendor files bound for the shared cache.
    pub cache_files: Vec<(PathBuf, String)>,
    /// Vendor files dropped by host filtering.
    pub filtered: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedWrite {
    pub file: String,
    pub status: FileStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnippetOutcome {
    pub key: String,
    pub status: SnippetStatus,
}

/// What generating one module did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleOutcome {
    pub module: String,
    pub version: String,
    pub variant: String,
    pub written: Vec<String>,
    pub unchanged: Vec<String>,
    pub skipped: Vec<SkippedWrite>,
    pub filtered_vendor: Vec<String>,
    pub cached_vendor: Vec<String>,
    pub snippets: Vec<SnippetOutcome>,
    pub dependencies: Option<DependencyOutcome>,
    pub warnings: Vec<String>,
}

pub struct GeneratorService {
    ports: Ports,
    plugins: PluginRegistry,
    settings: GeneratorSettings,
    snippets: SnippetEngine,
}

impl GeneratorService {
    pub fn new(ports: Ports, plugins: PluginRegistry, settings: GeneratorSettings) -> Self {
        let snippets = SnippetEngine::new(ports.clone());
        Self {
            ports,
            plugins,
            settings,
            snippets,
        }
    }

    pub fn ports(&self) -> &Ports {
        &self.ports
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn snippets(&self) -> &SnippetEngine {
        &self.snippets
    }

    fn host_kind(&self, state: &ProjectState) -> HostKind {
        if let Some(kind) = state
            .context
            .target_framework
            .as_deref()
            .and_then(HostKind::from_hint)
        {
            return kind;
        }
        let fs = self.ports.fs.as_ref();
        match (
            fs.exists(&state.layout.pyproject()),
            fs.exists(&state.layout.package_json()),
        ) {
            (true, false) => HostKind::Python,
            (false, true) => HostKind::Node,
            _ => HostKind::Mixed,
        }
    }

    /// The shared cache when configured, otherwise the project's own root.
    fn vendor_root(&self, state: &ProjectState, manifest: &ModuleManifest) -> VendorRoot {
        if let Some(cache) = &self.settings.vendor_cache {
            return VendorRoot::Cache(cache.clone());
        }
        let root = state
            .context
            .vendor_root
            .clone()
            .unwrap_or_else(|| manifest.generation.vendor.root.clone());
        if Path::new(&root).is_absolute() {
            VendorRoot::Cache(PathBuf::from(root))
        } else {
            VendorRoot::Project(root.trim_end_matches('/').to_string())
        }
    }

    fn base_context(
        &self,
        state: &ProjectState,
        manifest: &ModuleManifest,
        plugin: &dyn FrameworkPlugin,
        variables: &RenderContext,
    ) -> RapidkitResult<RenderContext> {
        let basename = manifest.basename();
        let version = manifest.version.to_string();
        let vendor_relative_path = match self.vendor_root(state, manifest) {
            VendorRoot::Project(root) => format!("{root}/{basename}/{version}"),
            VendorRoot::Cache(cache) => cache.join(basename).join(&version).display().to_string(),
        };

        let mut ctx = RenderContext::new()
            .with("module_name", basename)
            .with("module_slug", manifest.name.as_str())
            .with("module_class_name", to_pascal(basename))
            .with("module_version", version.as_str())
            .with("vendor_module", basename)
            .with("vendor_version", version.as_str())
            .with("vendor_relative_path", vendor_relative_path)
            .with("project_name", state.metadata.project_name.as_str())
            .with("variant", plugin.name())
            .with("engine", state.metadata.engine.to_string());
        for (key, value) in &manifest.generation.defaults {
            ctx.insert_default(key.clone(), value.clone());
        }
        ctx.extend_map(&state.context.variables);

        if let Some(overrides) = self.ports.modules.load_overrides(&manifest.name)? {
            let applied = overrides.apply(basename, &mut ctx, &self.settings.env)?;
            if !applied.is_empty() {
                debug!(module = %manifest.name, ?applied, "Applied overrides");
            }
        }

        let enrichments = plugin.context_enrichments(&ctx);
        ctx.extend(&enrichments);
        ctx.extend(variables);
        Ok(ctx)
    }

    fn resolve_entry(
        &self,
        manifest: &ModuleManifest,
        plugin: &dyn FrameworkPlugin,
        entry: &VariantFile,
        ctx: &RenderContext,
    ) -> RapidkitResult<(String, String)> {
        let (template, output) = match &entry.logical {
            Some(logical) => {
                let template = plugin.template_mappings().get(logical);
                let output = plugin.output_paths().get(logical);
                match (template, output) {
                    (Some(t), Some(o)) => (t.clone(), o.clone()),
                    _ => {
                        return Err(ApplicationError::Generator {
                            message: format!(
                                "plugin '{}' has no logical file '{logical}'",
                                plugin.name()
                            ),
                            exit_code: 1,
                            context: BTreeMap::from([
                                ("module".to_string(), manifest.name.clone()),
                                ("logical".to_string(), logical.clone()),
                            ]),
                        }
                        .into());
                    }
                }
            }
            None => match (&entry.template, &entry.output) {
                (Some(t), Some(o)) => (t.clone(), o.clone()),
                _ => {
                    return Err(ApplicationError::generator(format!(
                        "module '{}' has a variant file without template/output",
                        manifest.name
                    ))
                    .into());
                }
            },
        };
        Ok((expand_tokens(&template, ctx), expand_tokens(&output, ctx)))
    }

    fn render_file(
        &self,
        slug: &str,
        template: &str,
        target: &str,
        ctx: &RenderContext,
    ) -> RapidkitResult<String> {
        let source = self.ports.modules.read_template(slug, template)?;
        self.ports.renderer.render(target, &source, ctx)
    }

    /// Render a module without touching the project.
    #[instrument(skip(self, state, variables))]
    pub fn render_module(
        &self,
        state: &ProjectState,
        slug: &str,
        variables: &RenderContext,
    ) -> RapidkitResult<RenderedModule> {
        let manifest = self.ports.modules.load_manifest(slug)?;
        let variant = state.metadata.variant.clone();
        let plugin = self.plugins.get(&variant)?;
        let spec = manifest
            .variant(&variant)
            .ok_or_else(|| ApplicationError::UnknownVariant {
                module: slug.to_string(),
                variant: variant.clone(),
                available: manifest.variant_names().map(str::to_string).collect(),
            })?;
        let ctx = self.base_context(state, &manifest, plugin.as_ref(), variables)?;

        let mut files = Vec::new();
        let mut cache_files = Vec::new();
        let mut filtered = Vec::new();
        let basename = manifest.basename();
        let version = manifest.version.to_string();

        match self.vendor_root(state, &manifest) {
            VendorRoot::Project(root) => {
                let host = self.host_kind(state);
                for entry in &manifest.generation.vendor.files {
                    if !host.accepts_vendor_file(&entry.relative) {
                        filtered.push(entry.relative.clone());
                        continue;
                    }
                    let path = ProjectPath::try_new(format!(
                        "{root}/{basename}/{version}/{}",
                        entry.relative
                    ))?;
                    let content = self.render_file(
                        slug,
                        &entry.template,
                        path.as_str(),
                        &ctx.merged(&entry.context),
                    )?;
                    files.push(RenderedFile {
                        path,
                        content,
                        kind: ArtifactKind::Vendor,
                    });
                }
                if !filtered.is_empty() {
                    debug!(?host, ?filtered, "Filtered vendor files for host");
                }
            }
            VendorRoot::Cache(cache) => {
                let dir = cache.join(basename).join(&version);
                for entry in &manifest.generation.vendor.files {
                    let rel = ProjectPath::try_new(&entry.relative)?;
                    let target = rel.to_fs(&dir);
                    let content = self.render_file(
                        slug,
                        &entry.template,
                        &target.display().to_string(),
                        &ctx.merged(&entry.context),
                    )?;
                    cache_files.push((target, content));
                }
            }
        }

        for entry in &spec.files {
            let file_ctx = ctx.merged(&entry.context);
            let (template, output) = self.resolve_entry(&manifest, plugin.as_ref(), entry, &file_ctx)?;
            let path = ProjectPath::try_new(&output)?;
            let content = self.render_file(slug, &template, path.as_str(), &file_ctx)?;
            files.push(RenderedFile {
                path,
                content,
                kind: ArtifactKind::Variant,
            });
        }

        for file in &mut files {
            let rendered = std::mem::take(&mut file.content);
            file.content = self.snippets.overlay_applied(state, &file.path, rendered);
        }

        Ok(RenderedModule {
            manifest,
            variant,
            context: ctx,
            files,
            cache_files,
            filtered,
        })
    }

    fn check_requirements(&self, plugin: &dyn FrameworkPlugin) -> RapidkitResult<()> {
        if !self.settings.check_requirements {
            return Ok(());
        }
        let errors = plugin.validate_requirements(self.ports.commands.as_ref());
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApplicationError::RequirementsFailed {
                framework: plugin.name().to_string(),
                errors,
            }
            .into())
        }
    }

    /// Generate `slug` into the project and commit it.
    #[instrument(skip(self, state, variables), fields(root = %state.layout.root().display()))]
    pub fn generate_module(
        &self,
        state: &mut ProjectState,
        slug: &str,
        variables: &RenderContext,
    ) -> RapidkitResult<ModuleOutcome> {
        let plugin = self.plugins.get(&state.metadata.variant)?;
        self.check_requirements(plugin.as_ref())?;

        let rendered = self.render_module(state, slug, variables)?;
        let fs = self.ports.fs.as_ref();
        let root = state.layout.root().to_path_buf();
        let version = rendered.manifest.version.to_string();

        plugin.pre_generation_hook(fs, &root)?;

        let mut staged = StagedChanges::new();
        let mut skipped = Vec::new();
        for file in rendered.files {
            let current = file_state(fs, &root, &state.hashes, &file.path, &file.content)?;
            match current.status {
                Some(status) if !status.is_safe_to_write() => {
                    warn!(file = %file.path, %status, "Not overwriting modified file");
                    skipped.push(SkippedWrite {
                        file: file.path.to_string(),
                        status,
                    });
                }
                status => staged.stage(StagedFile {
                    path: file.path,
                    content: file.content,
                    kind: file.kind,
                    status_before: status,
                })?,
            }
        }

        let mut cached_vendor = Vec::new();
        for (target, content) in &rendered.cache_files {
            if !fs.exists(target) {
                fs.write_file(target, content)?;
            }
            cached_vendor.push(target.display().to_string());
        }

        let snippets = self.place_snippets(state, &mut staged, &rendered.manifest, &rendered.variant, &rendered.context)?;

        state
            .ledger
            .upsert(slug, &version, self.ports.clock.now());
        state.metadata.add_module(slug);
        let summary = state.commit(fs, &staged, Some((slug, &version)))?;

        let dependencies = merge_module_dependencies(fs, state, &rendered.manifest, &rendered.variant)?;

        let mut warnings = Vec::new();
        if let Err(e) = plugin.post_generation_hook(fs, &root) {
            warn!(module = slug, error = %e, "Post-generation hook failed");
            warnings.push(format!("post-generation hook: {e}"));
        }

        info!(
            module = slug,
            version = %version,
            written = summary.written.len(),
            skipped = skipped.len(),
            "Generated module"
        );
        Ok(ModuleOutcome {
            module: slug.to_string(),
            version,
            variant: rendered.variant,
            written: summary.written,
            unchanged: summary.unchanged,
            skipped,
            filtered_vendor: rendered.filtered,
            cached_vendor,
            snippets,
            dependencies,
            warnings,
        })
    }

    fn place_snippets(
        &self,
        state: &mut ProjectState,
        staged: &mut StagedChanges,
        manifest: &ModuleManifest,
        variant: &str,
        ctx: &RenderContext,
    ) -> RapidkitResult<Vec<SnippetOutcome>> {
        let Some(config) = &manifest.generation.snippets else {
            return Ok(Vec::new());
        };
        let catalog = self.ports.modules.load_snippets(&manifest.name, &config.config)?;
        let producer = manifest.name.as_str();

        let mut defs: Vec<_> = catalog
            .snippets
            .into_iter()
            .filter(|d| d.applies_to(variant))
            .collect();
        defs.sort_by(|a, b| injection_order((producer, a), (producer, b)));

        let mut out = Vec::new();
        for definition in defs {
            let context = ctx.merged(&definition.context);
            let target = ProjectPath::try_new(expand_tokens(&definition.target, &context))?;
            let request = InjectionRequest {
                producer: producer.to_string(),
                definition,
                target,
                context,
            };
            let result = self
                .snippets
                .inject_snippet_enterprise(state, staged, &request)?;
            out.push(SnippetOutcome {
                key: result.key,
                status: result.status,
            });
        }
        Ok(out)
    }
}
