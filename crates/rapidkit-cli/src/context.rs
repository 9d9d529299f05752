//! Composition root: turns [`AppConfig`] into adapters and services.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use rapidkit_adapters::plugins::load_plugin_dir;
use rapidkit_adapters::{
    FallbackRenderer, FsKitSource, FsModuleCatalog, LocalFilesystem, ManifestSigner,
    SimpleRenderer, StructureValidator, SystemCommandRunner, TeraRenderer,
};
use rapidkit_core::application::ports::{Ports, SystemClock, TemplateRenderer};
use rapidkit_core::application::{
    CatalogService, DiffService, GeneratorService, GeneratorSettings, InstallChecks,
    PluginRegistry, ProjectLayout, ProjectService, ProjectState,
};
use rapidkit_core::error::RapidkitError;

use crate::cli::GlobalArgs;
use crate::config::{AppConfig, RendererEngine};
use crate::error::CliResult;

/// Everything a command handler needs.
pub struct AppContext {
    pub config: AppConfig,
    /// Project root from `--project`.
    pub project: PathBuf,
    modules_root: PathBuf,
    kits_root: PathBuf,
    generator: Arc<GeneratorService>,
}

fn renderer_for(config: &AppConfig) -> Arc<dyn TemplateRenderer> {
    match (config.renderer.engine, config.renderer.allow_fallback) {
        (RendererEngine::Simple, _) => Arc::new(SimpleRenderer::new()),
        (RendererEngine::Tera, true) => {
            Arc::new(FallbackRenderer::new(Box::new(TeraRenderer::new())))
        }
        (RendererEngine::Tera, false) => Arc::new(TeraRenderer::new()),
    }
}

impl AppContext {
    /// Wire the adapters. Flags given on the command line win over config.
    #[instrument(skip_all)]
    pub fn build(global: &GlobalArgs, config: AppConfig) -> CliResult<Self> {
        let modules_root = global
            .modules_root
            .clone()
            .unwrap_or_else(|| config.modules_root.clone());
        let kits_root = global
            .kits_root
            .clone()
            .unwrap_or_else(|| config.kits_root.clone());

        let ports = Ports {
            fs: Arc::new(LocalFilesystem::new()),
            renderer: renderer_for(&config),
            modules: Arc::new(FsModuleCatalog::new(&modules_root)),
            commands: Arc::new(SystemCommandRunner::new()),
            clock: Arc::new(SystemClock),
        };

        let mut plugins = PluginRegistry::with_builtins();
        if let Some(dir) = &config.plugins_dir {
            let loaded = load_plugin_dir(dir, &mut plugins).map_err(RapidkitError::from)?;
            debug!(plugins = ?loaded, "Loaded declarative plugins");
        }

        let settings = GeneratorSettings {
            check_requirements: config.generation.check_requirements,
            vendor_cache: config.vendor_root.clone(),
            ..GeneratorSettings::default()
        }
        .with_env(std::env::vars());

        debug!(
            modules_root = %modules_root.display(),
            kits_root = %kits_root.display(),
            telemetry = config.telemetry,
            engine = ?config.renderer.engine,
            "Context ready"
        );

        Ok(Self {
            project: global.project.clone(),
            modules_root,
            kits_root,
            generator: Arc::new(GeneratorService::new(ports, plugins, settings)),
            config,
        })
    }

    pub fn generator(&self) -> &Arc<GeneratorService> {
        &self.generator
    }

    pub fn ports(&self) -> &Ports {
        self.generator.ports()
    }

    pub fn layout(&self) -> ProjectLayout {
        ProjectLayout::new(&self.project)
    }

    /// Project lifecycle with install checks wired in.
    pub fn projects(&self) -> CliResult<ProjectService> {
        let checks = InstallChecks {
            validator: Arc::new(self.validator()?),
            verifier: Arc::new(self.signer()),
        };
        Ok(ProjectService::new(
            self.generator.clone(),
            Arc::new(FsKitSource::new(&self.kits_root)),
            checks,
        )
        .with_install_timeout(Duration::from_secs(self.config.timeouts.package_manager_secs)))
    }

    fn validator(&self) -> CliResult<StructureValidator> {
        let ports = self.ports();
        let blueprint = self.config.blueprint_path(&self.modules_root);
        Ok(StructureValidator::from_blueprint_file(
            &self.modules_root,
            Some(&blueprint),
            ports.fs.clone(),
            ports.clock.clone(),
        )?)
    }

    pub fn diff(&self) -> DiffService {
        DiffService::new(self.generator.clone())
    }

    /// Load the project at `--project`; fails when it is not initialised.
    pub fn open_project(&self) -> CliResult<ProjectState> {
        Ok(self.projects()?.open(&self.project)?)
    }

    pub fn catalog(&self) -> CliResult<CatalogService> {
        Ok(CatalogService::new(
            self.ports().clone(),
            Arc::new(self.validator()?),
        ))
    }

    pub fn signer(&self) -> ManifestSigner {
        ManifestSigner::new(
            FsModuleCatalog::new(&self.modules_root),
            self.ports().fs.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_choice_follows_config() {
        let mut config = AppConfig::default();
        // Undefined variables fail on every choice; the fallback never masks them.
        let ctx = rapidkit_core::domain::RenderContext::new();
        for (engine, fallback) in [
            (RendererEngine::Tera, false),
            (RendererEngine::Tera, true),
            (RendererEngine::Simple, false),
        ] {
            config.renderer.engine = engine;
            config.renderer.allow_fallback = fallback;
            let renderer = renderer_for(&config);
            assert!(renderer.render("a.txt", "{{ missing }}", &ctx).is_err());
            assert_eq!(
                renderer.render("a.txt", "plain", &ctx).unwrap(),
                "plain"
            );
        }
    }
}
