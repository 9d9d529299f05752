//! Project lifecycle: create, install, init, checkpoint and rollback.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::application::ApplicationError;
use crate::application::layout::ProjectLayout;
use crate::application::plugins::expand_tokens;
use crate::application::ports::{
    CommandOutcome, CommandSpec, KitSource, ManifestVerifier, ModuleValidator, Ports,
    SignatureCheck,
};
use crate::application::reports::SnapshotGcReport;
use crate::application::services::dependency_service::{InstallPlan, plan_install};
use crate::application::services::generator_service::{GeneratorService, ModuleOutcome};
use crate::application::services::hash_service::{
    RestoreOutcome, SnapshotManager, SnapshotManifest,
};
use crate::application::state::ProjectState;
use crate::domain::{
    ArtifactKind, Engine, Kit, KitFile, ProjectContext, ProjectMetadata, ProjectPath,
    RenderContext, StagedChanges, StagedFile,
};
use crate::error::RapidkitResult;

/// Default limit for `poetry install` / `npm install`.
pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);

const TEMPLATE_SUFFIXES: [&str; 2] = [".j2", ".tera"];

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub kit: String,
    pub name: String,
    pub parent: PathBuf,
    pub force: bool,
    pub install_essentials: bool,
    /// Explicit `--var` values; stored in the project context.
    pub variables: RenderContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallOutcome {
    pub plan: InstallPlan,
    pub modules: Vec<ModuleOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOutcome {
    pub root: PathBuf,
    pub kit: String,
    pub variant: String,
    pub engine: Engine,
    pub files: Vec<String>,
    pub install: Option<InstallOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Failed,
    TimedOut,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitStep {
    pub command: String,
    pub status: StepStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitOutcome {
    pub engine: Engine,
    pub steps: Vec<InitStep>,
    pub warnings: Vec<String>,
}

fn validate_project_name(name: &str) -> RapidkitResult<()> {
    let ok = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(ApplicationError::ValidationFailed(format!(
            "invalid project name '{name}': use letters, digits, '-', '_' or '.'"
        ))
        .into())
    }
}

fn strip_template_suffix(relative: &str) -> &str {
    TEMPLATE_SUFFIXES
        .iter()
        .find_map(|suffix| relative.strip_suffix(suffix))
        .unwrap_or(relative)
}

/// Checks every module of an install plan must pass before any of them is
/// generated: the structure blueprint and, for signed manifests, the
/// signature.
#[derive(Clone)]
pub struct InstallChecks {
    pub validator: Arc<dyn ModuleValidator>,
    pub verifier: Arc<dyn ManifestVerifier>,
}

pub struct ProjectService {
    generator: Arc<GeneratorService>,
    kits: Arc<dyn KitSource>,
    checks: InstallChecks,
    skip_checks: bool,
    install_timeout: Duration,
}

impl ProjectService {
    pub fn new(
        generator: Arc<GeneratorService>,
        kits: Arc<dyn KitSource>,
        checks: InstallChecks,
    ) -> Self {
        Self {
            generator,
            kits,
            checks,
            skip_checks: false,
            install_timeout: DEFAULT_INSTALL_TIMEOUT,
        }
    }

    pub fn with_install_timeout(mut self, timeout: Duration) -> Self {
        self.install_timeout = timeout;
        self
    }

    /// Install without structure and signature checks.
    pub fn skip_checks(mut self, skip: bool) -> Self {
        self.skip_checks = skip;
        self
    }

    fn ports(&self) -> &Ports {
        self.generator.ports()
    }

    /// Load the project rooted at `root`.
    pub fn open(&self, root: &Path) -> RapidkitResult<ProjectState> {
        ProjectState::load(self.ports().fs.as_ref(), ProjectLayout::new(root))
    }

    /// Create a project from a kit.
    ///
    /// Everything up to and including `.rapidkit/project.json` is rolled
    /// back on failure. Module installation happens afterwards and its
    /// errors leave the created project in place.
    #[instrument(skip(self, request), fields(kit = %request.kit, name = %request.name))]
    pub fn create(&self, request: &CreateRequest) -> RapidkitResult<CreateOutcome> {
        validate_project_name(&request.name)?;
        let fs = self.ports().fs.as_ref();
        let root = request.parent.join(&request.name);

        if fs.exists(&root) {
            if !request.force {
                return Err(ApplicationError::ProjectExists { path: root }.into());
            }
            warn!(path = %root.display(), "Removing existing directory (--force)");
            fs.remove_dir_all(&root)?;
        }

        let (kit, files) = self.kits.load_kit(&request.kit)?;
        let mut state = match self.bootstrap(&root, &kit, &files, request) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "Create failed, rolling back");
                self.rollback_dir(&root);
                return Err(e);
            }
        };
        let written: Vec<String> = state.hashes.iter().map(|(p, _)| p.to_string()).collect();
        info!(root = %root.display(), files = written.len(), "Project created");

        let install = if request.install_essentials {
            let selected = kit.selected_modules(&request.variables);
            if selected.is_empty() {
                None
            } else {
                Some(self.install_modules(&mut state, &selected, &request.variables)?)
            }
        } else {
            None
        };

        Ok(CreateOutcome {
            root,
            kit: kit.name,
            variant: kit.variant,
            engine: kit.engine,
            files: written,
            install,
        })
    }

    fn bootstrap(
        &self,
        root: &Path,
        kit: &Kit,
        files: &[KitFile],
        request: &CreateRequest,
    ) -> RapidkitResult<ProjectState> {
        let ports = self.ports();
        let ctx = RenderContext::new()
            .with("project_name", request.name.as_str())
            .with("kit_name", kit.name.as_str())
            .with("variant", kit.variant.as_str())
            .with("engine", kit.engine.to_string())
            .merged(&request.variables.to_map());

        let mut staged = StagedChanges::new();
        for file in files {
            let relative = expand_tokens(strip_template_suffix(&file.relative), &ctx);
            let path = ProjectPath::try_new(&relative)?;
            let content = ports.renderer.render(path.as_str(), &file.source, &ctx)?;
            staged.stage(StagedFile {
                path,
                content,
                kind: ArtifactKind::Boilerplate,
                status_before: None,
            })?;
        }

        ports.fs.create_dir_all(root)?;
        let metadata = ProjectMetadata {
            project_name: request.name.clone(),
            kit: kit.name.clone(),
            variant: kit.variant.clone(),
            engine: kit.engine,
            created_at: ports.clock.now(),
            version: kit.version.clone(),
            modules: Vec::new(),
        };
        let context = ProjectContext {
            engine: Some(kit.engine),
            target_framework: Some(kit.variant.clone()),
            variables: request.variables.to_map(),
            ..ProjectContext::default()
        };
        let mut state = ProjectState::new(ProjectLayout::new(root), metadata, context);
        let owner = format!("kit:{}", kit.name);
        state.commit(ports.fs.as_ref(), &staged, Some((&owner, &kit.version)))?;
        Ok(state)
    }

    fn rollback_dir(&self, root: &Path) {
        match self.ports().fs.remove_dir_all(root) {
            Ok(()) => info!(path = %root.display(), "Rollback successful"),
            Err(e) => warn!(error = %e, path = %root.display(), "Rollback failed"),
        }
    }

    /// Run [`InstallChecks`] over `order`. The first failing module stops
    /// the install before anything is written.
    fn check_plan(&self, order: &[String]) -> RapidkitResult<()> {
        if self.skip_checks {
            warn!(
                modules = order.len(),
                "Structure and signature checks skipped"
            );
            return Ok(());
        }
        for slug in order {
            let manifest = self.ports().modules.load_manifest(slug)?;
            self.checks
                .validator
                .ensure_module_structure(slug, Some(&manifest))?;
            match self.checks.verifier.verify(slug)? {
                SignatureCheck::Invalid => {
                    return Err(ApplicationError::SignatureError {
                        module: slug.clone(),
                        reason: "signature does not verify under any listed signer".into(),
                    }
                    .into());
                }
                SignatureCheck::Unsigned => debug!(module = %slug, "Manifest is unsigned"),
                SignatureCheck::Valid => debug!(module = %slug, "Manifest signature verified"),
            }
        }
        Ok(())
    }

    /// Plan `slugs` with their dependencies, check them and generate them
    /// in order.
    pub fn install_modules(
        &self,
        state: &mut ProjectState,
        slugs: &[String],
        variables: &RenderContext,
    ) -> RapidkitResult<InstallOutcome> {
        let plan = plan_install(self.ports().modules.as_ref(), slugs, &state.ledger)?;
        self.check_plan(&plan.order)?;
        let mut modules = Vec::with_capacity(plan.order.len());
        for slug in &plan.order {
            modules.push(self.generator.generate_module(state, slug, variables)?);
        }
        Ok(InstallOutcome { plan, modules })
    }

    /// `add module <slug>`.
    pub fn add_module(
        &self,
        state: &mut ProjectState,
        slug: &str,
        variables: &RenderContext,
    ) -> RapidkitResult<InstallOutcome> {
        self.install_modules(state, &[slug.to_string()], variables)
    }

    /// Set up the host runtime and install host dependencies. Command
    /// failures are reported as warnings.
    #[instrument(skip(self, state), fields(root = %state.layout.root().display()))]
    pub fn init(&self, state: &ProjectState) -> InitOutcome {
        let root = state.layout.root();
        let engine = state.metadata.engine;
        let commands = match engine {
            Engine::Python => vec![
                CommandSpec::new("python3", &["-m", "venv", ".venv"], self.install_timeout),
                CommandSpec::new("poetry", &["install"], self.install_timeout),
            ],
            Engine::Npm => vec![CommandSpec::new("npm", &["install"], self.install_timeout)],
        };

        let mut steps = Vec::new();
        let mut warnings = Vec::new();
        for spec in commands {
            let spec = spec.in_dir(root);
            let command = spec.display();
            let status = match self.ports().commands.run(&spec) {
                CommandOutcome::Completed { success: true, .. } => StepStatus::Ok,
                CommandOutcome::Completed { code, stderr, .. } => {
                    warnings.push(format!(
                        "'{command}' exited with {}: {}",
                        code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                        stderr.trim()
                    ));
                    StepStatus::Failed
                }
                CommandOutcome::TimedOut => {
                    warnings.push(format!(
                        "'{command}' timed out after {}s",
                        self.install_timeout.as_secs()
                    ));
                    StepStatus::TimedOut
                }
                CommandOutcome::NotFound => {
                    warnings.push(format!("'{}' is not installed", spec.program));
                    StepStatus::NotFound
                }
            };
            if status != StepStatus::Ok {
                warn!(%command, ?status, "Init step did not succeed");
            }
            steps.push(InitStep { command, status });
        }
        info!(steps = steps.len(), warnings = warnings.len(), "Initialized project runtime");
        InitOutcome {
            engine,
            steps,
            warnings,
        }
    }

    fn snapshots(&self, root: &Path) -> SnapshotManager {
        let ports = self.ports();
        SnapshotManager::new(ports.fs.clone(), ports.clock.clone(), ProjectLayout::new(root))
    }

    pub fn checkpoint(&self, root: &Path, label: Option<&str>) -> RapidkitResult<SnapshotManifest> {
        self.snapshots(root).create(label)
    }

    pub fn rollback(&self, root: &Path, id: Option<&str>) -> RapidkitResult<RestoreOutcome> {
        ProjectLayout::new(root).require_initialized(self.ports().fs.as_ref())?;
        self.snapshots(root).restore(id)
    }

    pub fn list_snapshots(&self, root: &Path) -> RapidkitResult<Vec<SnapshotManifest>> {
        self.snapshots(root).list()
    }

    pub fn snapshot_gc(
        &self,
        root: &Path,
        keep: usize,
        dry_run: bool,
    ) -> RapidkitResult<SnapshotGcReport> {
        self.snapshots(root).gc(keep, dry_run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::output::Filesystem;
    use crate::application::services::test_support::{FixedChecks, TestProject, settings_catalog};
    use crate::domain::ContextValue;
    use pretty_assertions::assert_eq;

    struct OneKit {
        files: Vec<KitFile>,
    }

    impl OneKit {
        fn standard() -> Self {
            Self {
                files: vec![
                    KitFile {
                        relative: "README.md.j2".into(),
                        source: "# {{ project_name }}\n".into(),
                    },
                    KitFile {
                        relative: "pyproject.toml.j2".into(),
                        source: "[tool.poetry]\nname = \"{{ project_name }}\"\n\n[tool.poetry.dependencies]\npython = \"^3.10\"\n".into(),
                    },
                ],
            }
        }
    }

    impl KitSource for OneKit {
        fn load_kit(&self, name: &str) -> RapidkitResult<(Kit, Vec<KitFile>)> {
            if name != "fastapi.standard" {
                return Err(ApplicationError::KitNotFound { kit: name.into() }.into());
            }
            let kit = Kit::parse(
                "name: fastapi.standard\nversion: 1.0.0\nvariant: fastapi\nengine: python\nessential_modules:\n  - slug: free/essentials/settings\n    toggle: install_settings\n  - slug: free/database/db_postgres\n    toggle: install_database\n",
            )?;
            Ok((kit, self.files.clone()))
        }

        fn list_kits(&self) -> RapidkitResult<Vec<Kit>> {
            Ok(vec![self.load_kit("fastapi.standard")?.0])
        }
    }

    fn service(project: &TestProject, kit: OneKit) -> ProjectService {
        checked_service(project, kit, FixedChecks::install(true, SignatureCheck::Unsigned))
    }

    fn checked_service(project: &TestProject, kit: OneKit, checks: InstallChecks) -> ProjectService {
        ProjectService::new(Arc::new(project.generator()), Arc::new(kit), checks)
    }

    fn bare_project(service: &ProjectService) -> ProjectState {
        let mut no_modules = request(RenderContext::new());
        no_modules.install_essentials = false;
        let outcome = service.create(&no_modules).unwrap();
        service.open(&outcome.root).unwrap()
    }

    fn request(variables: RenderContext) -> CreateRequest {
        CreateRequest {
            kit: "fastapi.standard".into(),
            name: "app".into(),
            parent: PathBuf::from("/work"),
            force: false,
            install_essentials: true,
            variables,
        }
    }

    #[test]
    fn create_writes_boilerplate_and_metadata() {
        let project = TestProject::new(settings_catalog());
        let outcome = service(&project, OneKit::standard())
            .create(&request(RenderContext::new().with("install_database", false)))
            .unwrap();

        assert_eq!(outcome.variant, "fastapi");
        assert_eq!(project.read("README.md").unwrap(), "# app\n");
        assert!(project.read(".rapidkit/project.json").is_some());
        let install = outcome.install.unwrap();
        assert_eq!(install.plan.order, vec!["free/essentials/settings"]);
    }

    #[test]
    fn explicit_variables_are_kept_in_context() {
        let project = TestProject::new(settings_catalog());
        let service = service(&project, OneKit::standard());
        service
            .create(&request(RenderContext::new().with("install_database", false)))
            .unwrap();
        let state = service.open(&project.root()).unwrap();
        assert_eq!(
            state.context.variables.get("install_database"),
            Some(&ContextValue::Bool(false))
        );
    }

    #[test]
    fn existing_directory_needs_force() {
        let project = TestProject::new(settings_catalog());
        project.write("keep.txt", "x");
        let service = service(&project, OneKit::standard());
        let err = service.create(&request(RenderContext::new())).unwrap_err();
        assert!(matches!(
            err,
            crate::error::RapidkitError::Application(ApplicationError::ProjectExists { .. })
        ));

        let mut forced = request(RenderContext::new());
        forced.force = true;
        forced.install_essentials = false;
        service.create(&forced).unwrap();
        assert!(project.read("keep.txt").is_none());
    }

    #[test]
    fn failed_bootstrap_removes_the_project() {
        let project = TestProject::new(settings_catalog());
        let kit = OneKit {
            files: vec![KitFile {
                relative: "main.py.j2".into(),
                source: "{{ not_defined }}".into(),
            }],
        };
        assert!(service(&project, kit).create(&request(RenderContext::new())).is_err());
        assert!(!project.fs.exists(&project.root()));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let project = TestProject::new(settings_catalog());
        let mut bad = request(RenderContext::new());
        bad.name = "../escape".into();
        let err = service(&project, OneKit::standard()).create(&bad).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn add_module_pulls_dependencies() {
        let project = TestProject::new(settings_catalog());
        let service = service(&project, OneKit::standard());
        let mut no_modules = request(RenderContext::new());
        no_modules.install_essentials = false;
        service.create(&no_modules).unwrap();

        let mut state = service.open(&project.root()).unwrap();
        let outcome = service
            .add_module(&mut state, "free/database/db_postgres", &RenderContext::new())
            .unwrap();
        assert_eq!(outcome.modules.len(), 2);
        assert!(project.read("src/db/db_postgres.py").is_some());
        assert!(project.read("pyproject.toml").unwrap().contains("asyncpg"));
    }

    #[test]
    fn bad_signature_blocks_install_before_writing() {
        let project = TestProject::new(settings_catalog());
        let service = checked_service(
            &project,
            OneKit::standard(),
            FixedChecks::install(true, SignatureCheck::Invalid),
        );
        let mut state = bare_project(&service);

        let err = service
            .add_module(&mut state, "free/database/db_postgres", &RenderContext::new())
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("free/essentials/core"));
        assert!(project.read("src/core.py").is_none());
        assert!(project.read("src/db/db_postgres.py").is_none());
        assert!(state.ledger.installed_modules.is_empty());
    }

    #[test]
    fn structure_failure_blocks_install() {
        let project = TestProject::new(settings_catalog());
        let service = checked_service(
            &project,
            OneKit::standard(),
            FixedChecks::install(false, SignatureCheck::Valid),
        );
        let mut state = bare_project(&service);

        let err = service
            .add_module(&mut state, "free/essentials/settings", &RenderContext::new())
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(project.read("src/settings.py").is_none());
    }

    #[test]
    fn skipped_checks_let_the_install_through() {
        let project = TestProject::new(settings_catalog());
        let service = checked_service(
            &project,
            OneKit::standard(),
            FixedChecks::install(false, SignatureCheck::Invalid),
        )
        .skip_checks(true);
        let mut state = bare_project(&service);

        service
            .add_module(&mut state, "free/essentials/settings", &RenderContext::new())
            .unwrap();
        assert!(project.read("src/settings.py").is_some());
    }

    #[test]
    fn init_reports_missing_tools_as_warnings() {
        let project = TestProject::new(settings_catalog());
        let service = service(&project, OneKit::standard());
        let mut no_modules = request(RenderContext::new());
        no_modules.install_essentials = false;
        service.create(&no_modules).unwrap();
        project.commands_report_missing();

        let outcome = service.init(&service.open(&project.root()).unwrap());
        assert_eq!(outcome.steps.len(), 2);
        assert!(outcome.steps.iter().all(|s| s.status == StepStatus::NotFound));
        assert_eq!(outcome.warnings.len(), 2);
    }

    #[test]
    fn checkpoint_then_rollback_restores_files() {
        let project = TestProject::new(settings_catalog());
        let service = service(&project, OneKit::standard());
        let mut no_modules = request(RenderContext::new());
        no_modules.install_essentials = false;
        service.create(&no_modules).unwrap();

        let snapshot = service.checkpoint(&project.root(), Some("before")).unwrap();
        assert!(snapshot.id.ends_with("-before"));
        project.write("README.md", "scribbled\n");

        let restored = service.rollback(&project.root(), None).unwrap();
        assert_eq!(restored.id, snapshot.id);
        assert_eq!(project.read("README.md").unwrap(), "# app\n");
    }

    #[test]
    fn snapshot_gc_dry_run_keeps_everything() {
        let project = TestProject::new(settings_catalog());
        for i in 0..5 {
            project.write(&format!(".rapidkit/snapshots/2025010{i}T000000.000Z"), "x");
        }
        let report = service(&project, OneKit::standard())
            .snapshot_gc(&project.root(), 2, true)
            .unwrap();
        assert_eq!((report.kept, report.deleted, report.keep_limit), (2, 3, 2));
        assert!(report.dry_run);
        assert_eq!(
            project
                .fs
                .list_dir(&project.root().join(".rapidkit/snapshots"))
                .unwrap()
                .len(),
            5
        );
    }
}
