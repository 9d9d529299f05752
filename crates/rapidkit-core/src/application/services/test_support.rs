//! In-memory ports for service tests.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;

use crate::application::ApplicationError;
use crate::application::layout::ProjectLayout;
use crate::application::plugins::PluginRegistry;
use crate::application::ports::{
    Clock, CommandOutcome, CommandRunner, CommandSpec, Filesystem, ManifestVerifier,
    ModuleSource, ModuleValidator, Ports, SignatureCheck, TemplateRenderer,
};
use crate::application::services::generator_service::{GeneratorService, GeneratorSettings};
use crate::application::services::project_service::InstallChecks;
use crate::application::state::ProjectState;
use crate::domain::{
    Engine, ModuleManifest, OverrideSpec, ProjectContext, ProjectMetadata, RenderContext,
    SnippetCatalog, ValidationResult,
};
use crate::error::RapidkitResult;

#[derive(Default)]
pub struct MemoryFs {
    files: Mutex<BTreeMap<PathBuf, String>>,
    dirs: Mutex<BTreeSet<PathBuf>>,
}

impl MemoryFs {
    fn add_ancestors(&self, path: &Path) {
        let mut dirs = self.dirs.lock().unwrap();
        for ancestor in path.ancestors().skip(1) {
            dirs.insert(ancestor.to_path_buf());
        }
    }
}

impl Filesystem for MemoryFs {
    fn create_dir_all(&self, path: &Path) -> RapidkitResult<()> {
        self.add_ancestors(path);
        self.dirs.lock().unwrap().insert(path.to_path_buf());
        Ok(())
    }

    fn write_file(&self, path: &Path, content: &str) -> RapidkitResult<()> {
        self.add_ancestors(path);
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn append_file(&self, path: &Path, content: &str) -> RapidkitResult<()> {
        self.add_ancestors(path);
        self.files
            .lock()
            .unwrap()
            .entry(path.to_path_buf())
            .or_default()
            .push_str(content);
        Ok(())
    }

    fn read_file(&self, path: &Path) -> RapidkitResult<Option<String>> {
        Ok(self.files.lock().unwrap().get(path).cloned())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path) || self.dirs.lock().unwrap().contains(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.lock().unwrap().contains(path)
    }

    fn list_dir(&self, path: &Path) -> RapidkitResult<Vec<PathBuf>> {
        let mut out: BTreeSet<PathBuf> = BTreeSet::new();
        for p in self.files.lock().unwrap().keys() {
            if p.parent() == Some(path) {
                out.insert(p.clone());
            }
        }
        for p in self.dirs.lock().unwrap().iter() {
            if p.parent() == Some(path) {
                out.insert(p.clone());
            }
        }
        Ok(out.into_iter().collect())
    }

    fn remove_file(&self, path: &Path) -> RapidkitResult<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> RapidkitResult<()> {
        self.files.lock().unwrap().retain(|p, _| !p.starts_with(path));
        self.dirs.lock().unwrap().retain(|p| !p.starts_with(path));
        Ok(())
    }
}

static VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").unwrap());

/// `{{ var }}` substitution, strict about undefined names.
pub struct StrictRenderer;

impl TemplateRenderer for StrictRenderer {
    fn render(&self, name: &str, source: &str, context: &RenderContext) -> RapidkitResult<String> {
        if let Some(missing) = VAR
            .captures_iter(source)
            .map(|c| c[1].to_string())
            .find(|v| !context.contains(v))
        {
            return Err(ApplicationError::UndefinedVariable {
                template: name.to_string(),
                variable: missing,
            }
            .into());
        }
        Ok(VAR
            .replace_all(source, |c: &regex::Captures<'_>| {
                context.get(&c[1]).map(|v| v.to_string()).unwrap_or_default()
            })
            .into_owned())
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Default)]
pub struct StubCommands {
    missing: AtomicBool,
}

impl CommandRunner for StubCommands {
    fn run(&self, spec: &CommandSpec) -> CommandOutcome {
        if self.missing.load(Ordering::SeqCst) {
            return CommandOutcome::NotFound;
        }
        let stdout = match spec.program.as_str() {
            "node" => "v20.11.1\n",
            _ => "Python 3.12.1\n",
        };
        CommandOutcome::Completed {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

/// Validator and verifier with fixed answers for every module.
pub struct FixedChecks {
    pub structure_valid: bool,
    pub signature: SignatureCheck,
}

impl FixedChecks {
    pub fn install(structure_valid: bool, signature: SignatureCheck) -> InstallChecks {
        let checks = Arc::new(Self {
            structure_valid,
            signature,
        });
        InstallChecks {
            validator: checks.clone(),
            verifier: checks,
        }
    }
}

impl ModuleValidator for FixedChecks {
    fn validate<'a>(
        &self,
        slug: &str,
        _manifest: Option<&'a ModuleManifest>,
    ) -> RapidkitResult<ValidationResult> {
        Ok(ValidationResult {
            module: slug.to_string(),
            module_path: format!("/catalog/{slug}"),
            valid: self.structure_valid,
            parity_valid: true,
            spec_version: 1,
            missing_files: if self.structure_valid {
                Vec::new()
            } else {
                vec!["module.yaml".into()]
            },
            missing_directories: Vec::new(),
            extra_files: Vec::new(),
            extra_directories: Vec::new(),
            verification_file: ".module_verification.json".into(),
            tree_hash: String::new(),
            messages: Vec::new(),
        })
    }
}

impl ManifestVerifier for FixedChecks {
    fn verify(&self, _slug: &str) -> RapidkitResult<SignatureCheck> {
        Ok(self.signature)
    }
}

#[derive(Default, Clone)]
struct StaticModule {
    manifest: String,
    templates: BTreeMap<String, String>,
    documents: BTreeMap<String, String>,
}

/// Module catalog held in memory.
#[derive(Default, Clone)]
pub struct StaticCatalog {
    modules: BTreeMap<String, StaticModule>,
}

impl StaticCatalog {
    pub fn add_module(&mut self, slug: &str, extra_yaml: &str) {
        let manifest = format!("name: {slug}\nversion: 1.0.0\ntier: free\n{extra_yaml}");
        self.modules.entry(slug.to_string()).or_default().manifest = manifest;
    }

    /// Raw `module.yaml`, without the default header.
    pub fn set_manifest(&mut self, slug: &str, yaml: &str) {
        self.modules.entry(slug.to_string()).or_default().manifest = yaml.to_string();
    }

    pub fn add_template(&mut self, slug: &str, path: &str, source: &str) {
        self.modules
            .entry(slug.to_string())
            .or_default()
            .templates
            .insert(path.to_string(), source.to_string());
    }

    pub fn add_document(&mut self, slug: &str, path: &str, yaml: &str) {
        self.modules
            .entry(slug.to_string())
            .or_default()
            .documents
            .insert(path.to_string(), yaml.to_string());
    }

    fn module(&self, slug: &str) -> RapidkitResult<&StaticModule> {
        self.modules.get(slug).ok_or_else(|| {
            ApplicationError::ModuleNotFound {
                slug: slug.to_string(),
            }
            .into()
        })
    }
}

impl ModuleSource for StaticCatalog {
    fn discover(&self) -> RapidkitResult<Vec<String>> {
        Ok(self.modules.keys().cloned().collect())
    }

    fn load_manifest(&self, slug: &str) -> RapidkitResult<ModuleManifest> {
        let module = self.module(slug)?;
        Ok(ModuleManifest::parse(slug, &module.manifest).map_err(crate::domain::DomainError::from)?)
    }

    fn read_template(&self, slug: &str, template: &str) -> RapidkitResult<String> {
        self.module(slug)?
            .templates
            .get(template)
            .cloned()
            .ok_or_else(|| {
                ApplicationError::TemplateNotFound {
                    module: slug.to_string(),
                    template: template.to_string(),
                }
                .into()
            })
    }

    fn load_overrides(&self, slug: &str) -> RapidkitResult<Option<OverrideSpec>> {
        match self.module(slug)?.documents.get("overrides.yaml") {
            Some(yaml) => Ok(Some(OverrideSpec::parse(yaml)?)),
            None => Ok(None),
        }
    }

    fn load_snippets(&self, slug: &str, config: &str) -> RapidkitResult<SnippetCatalog> {
        let yaml = self.module(slug)?.documents.get(config).cloned().unwrap_or_default();
        Ok(SnippetCatalog::parse(&yaml)?)
    }

    fn module_path(&self, slug: &str) -> PathBuf {
        PathBuf::from("/catalog").join(slug)
    }
}

const SETTINGS_PY: &str = "class Settings:\n    project = \"{{ project_name }}\"\n    # <<<inject:settings_fields>>>\n";

/// Three modules: `core`, `settings` (owns `src/settings.py` with an
/// anchor) and `db_postgres` (depends on core, injects into settings).
pub fn settings_catalog() -> StaticCatalog {
    let mut catalog = StaticCatalog::default();

    catalog.add_module(
        "free/essentials/core",
        "generation:\n  variants:\n    fastapi:\n      files:\n        - template: core.py.j2\n          output: src/core.py\n",
    );
    catalog.add_template("free/essentials/core", "core.py.j2", "# core for {{ project_name }}\n");

    catalog.add_module(
        "free/essentials/settings",
        r#"generation:
  vendor:
    files:
      - template: vendor/settings_runtime.py.j2
        relative: settings_runtime.py
      - template: vendor/settings.ts.j2
        relative: nestjs/settings.ts
  variants:
    fastapi:
      files:
        - template: variants/fastapi/settings.py.j2
          output: src/settings.py
"#,
    );
    catalog.add_template(
        "free/essentials/settings",
        "vendor/settings_runtime.py.j2",
        "VERSION = \"{{ vendor_version }}\"\n",
    );
    catalog.add_template(
        "free/essentials/settings",
        "vendor/settings.ts.j2",
        "export const VERSION = '{{ vendor_version }}';\n",
    );
    catalog.add_template("free/essentials/settings", "variants/fastapi/settings.py.j2", SETTINGS_PY);

    catalog.add_module(
        "free/database/db_postgres",
        r#"depends_on: [free/essentials/core]
dependencies:
  fastapi:
    - name: asyncpg
      version: "^0.29.0"
generation:
  defaults:
    database_url: postgresql://localhost/app
  variants:
    fastapi:
      files:
        - template: variants/fastapi/db.py.j2
          output: src/db/{{ module_name }}.py
  snippets:
    config: snippets.yaml
"#,
    );
    catalog.add_template(
        "free/database/db_postgres",
        "variants/fastapi/db.py.j2",
        "DSN = \"{{ database_url }}\"\n",
    );
    catalog.add_template(
        "free/database/db_postgres",
        "snippets/settings_fields.py.j2",
        "DATABASE_URL = \"{{ database_url }}\"\n",
    );
    catalog.add_document(
        "free/database/db_postgres",
        "snippets.yaml",
        r#"snippets:
  - id: db_postgres_settings_fields
    target: src/settings.py
    anchor: settings_fields
    template: snippets/settings_fields.py.j2
    owner: free/essentials/settings
"#,
    );
    catalog
}

/// [`settings_catalog`] plus `free/cache/redis`, a second producer on the
/// `settings_fields` anchor that outranks `db_postgres` (priority 10).
pub fn two_producer_catalog() -> StaticCatalog {
    let mut catalog = settings_catalog();
    catalog.add_module(
        "free/cache/redis",
        r#"generation:
  defaults:
    redis_url: redis://localhost:6379/0
  variants:
    fastapi:
      files:
        - template: cache.py.j2
          output: src/cache.py
  snippets:
    config: snippets.yaml
"#,
    );
    catalog.add_template("free/cache/redis", "cache.py.j2", "URL = \"{{ redis_url }}\"\n");
    catalog.add_template(
        "free/cache/redis",
        "snippets/settings_fields.py.j2",
        "REDIS_URL = \"{{ redis_url }}\"\n",
    );
    catalog.add_document(
        "free/cache/redis",
        "snippets.yaml",
        r#"snippets:
  - id: redis_settings_fields
    target: src/settings.py
    anchor: settings_fields
    template: snippets/settings_fields.py.j2
    owner: free/essentials/settings
    priority: 10
"#,
    );
    catalog
}

/// A project rooted at `/work/app` over in-memory ports.
pub struct TestProject {
    pub fs: Arc<MemoryFs>,
    pub modules: Arc<StaticCatalog>,
    commands: Arc<StubCommands>,
    clock: Arc<FixedClock>,
}

impl TestProject {
    pub fn new(catalog: StaticCatalog) -> Self {
        Self::with_fs(catalog, Arc::new(MemoryFs::default()))
    }

    /// Another catalog over an existing project tree.
    pub fn with_fs(catalog: StaticCatalog, fs: Arc<MemoryFs>) -> Self {
        Self {
            fs,
            modules: Arc::new(catalog),
            commands: Arc::new(StubCommands::default()),
            clock: Arc::new(FixedClock(
                Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            )),
        }
    }

    pub fn root(&self) -> PathBuf {
        PathBuf::from("/work/app")
    }

    pub fn layout(&self) -> ProjectLayout {
        ProjectLayout::new(self.root())
    }

    pub fn ports(&self) -> Ports {
        Ports {
            fs: self.fs.clone(),
            renderer: Arc::new(StrictRenderer),
            modules: self.modules.clone(),
            commands: self.commands.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.0
    }

    pub fn state(&self) -> ProjectState {
        let metadata = ProjectMetadata {
            project_name: "app".into(),
            kit: "fastapi.standard".into(),
            variant: "fastapi".into(),
            engine: Engine::Python,
            created_at: self.clock_now(),
            version: "1.0.0".into(),
            modules: Vec::new(),
        };
        ProjectState::new(self.layout(), metadata, ProjectContext::default())
    }

    pub fn settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            check_requirements: false,
            ..GeneratorSettings::default()
        }
    }

    pub fn generator(&self) -> GeneratorService {
        self.generator_with(self.settings())
    }

    pub fn generator_with(&self, settings: GeneratorSettings) -> GeneratorService {
        GeneratorService::new(self.ports(), PluginRegistry::with_builtins(), settings)
    }

    pub fn commands_report_missing(&self) {
        self.commands.missing.store(true, Ordering::SeqCst);
    }

    pub fn db_url(&self) -> &'static str {
        "postgresql://localhost/app"
    }

    pub fn write(&self, rel: &str, content: &str) {
        self.fs.write_file(&self.root().join(rel), content).unwrap();
    }

    pub fn read(&self, rel: &str) -> Option<String> {
        self.fs.read_file(&self.root().join(rel)).unwrap()
    }
}
