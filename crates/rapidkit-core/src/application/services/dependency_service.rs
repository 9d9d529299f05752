//! Install planning over the module graph, and ecosystem dependency merges
//! into the host project's package manifest.

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::application::ApplicationError;
use crate::application::ports::{Filesystem, ModuleSource};
use crate::application::state::ProjectState;
use crate::domain::ecosystem::{merge_package_json, merge_poetry};
use crate::domain::{
    ArtifactKind, DomainError, Engine, InstalledLedger, ModuleGraph, ModuleManifest, ProjectPath,
    StagedChanges,
};
use crate::error::{RapidkitError, RapidkitResult};

/// Modules to generate, in dependency order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallPlan {
    pub requested: Vec<String>,
    pub order: Vec<String>,
    /// Dependencies pulled in by the closure but already installed.
    pub already_installed: Vec<String>,
}

/// Resolve `requested` plus its `depends_on` closure against the catalog.
///
/// Cycles and unknown dependencies are rejected here, before anything is
/// rendered. Dependencies already present in `ledger` are left out of the
/// order; requested modules are always regenerated.
#[instrument(skip(modules, ledger))]
pub fn plan_install(
    modules: &dyn ModuleSource,
    requested: &[String],
    ledger: &InstalledLedger,
) -> RapidkitResult<InstallPlan> {
    let catalog = modules.load_all_specs()?;

    for slug in requested {
        if !catalog.specs.contains_key(slug) {
            return Err(catalog.errors.get(slug).cloned().unwrap_or_else(|| {
                ApplicationError::ModuleNotFound { slug: slug.clone() }.into()
            }));
        }
    }

    let mut graph = ModuleGraph::new();
    for (slug, manifest) in &catalog.specs {
        graph.add_module(slug, manifest.depends_on.iter().cloned());
    }

    let closure = graph.closure(requested).map_err(|e| match &e {
        DomainError::UnknownDependency { dependency, .. } => catalog
            .errors
            .get(dependency)
            .cloned()
            .unwrap_or_else(|| RapidkitError::from(e.clone())),
        _ => RapidkitError::from(e.clone()),
    })?;
    let full = graph.install_order(&closure)?;

    let mut order = Vec::new();
    let mut already_installed = Vec::new();
    for slug in full {
        if ledger.contains(&slug) && !requested.contains(&slug) {
            already_installed.push(slug);
        } else {
            order.push(slug);
        }
    }

    debug!(?order, ?already_installed, "Install plan");
    Ok(InstallPlan {
        requested: requested.to_vec(),
        order,
        already_installed,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyOutcome {
    pub manifest_file: String,
    pub added: Vec<String>,
    pub upgraded: Vec<String>,
    pub kept: Vec<String>,
}

/// Merge the module's dependencies for `ecosystem` into `pyproject.toml`
/// or `package.json`, depending on the project engine.
///
/// A project without the manifest file is left alone.
pub fn merge_module_dependencies(
    fs: &dyn Filesystem,
    state: &mut ProjectState,
    manifest: &ModuleManifest,
    ecosystem: &str,
) -> RapidkitResult<Option<DependencyOutcome>> {
    let deps = manifest.ecosystem_dependencies(ecosystem);
    if deps.is_empty() {
        return Ok(None);
    }

    let (file, path) = match state.metadata.engine {
        Engine::Python => ("pyproject.toml", state.layout.pyproject()),
        Engine::Npm => ("package.json", state.layout.package_json()),
    };
    let Some(content) = fs.read_file(&path)? else {
        debug!(file, module = %manifest.name, "No package manifest; dependencies not merged");
        return Ok(None);
    };

    let merged = match state.metadata.engine {
        Engine::Python => merge_poetry(&content, deps),
        Engine::Npm => merge_package_json(&content, deps)?,
    };

    if merged.changed() {
        let mut staged = StagedChanges::new();
        staged.replace_content(
            &ProjectPath::try_new(file)?,
            merged.content.clone(),
            ArtifactKind::Dependency,
        );
        state.commit(fs, &staged, None)?;
        info!(
            file,
            module = %manifest.name,
            added = merged.added.len(),
            upgraded = merged.upgraded.len(),
            "Merged module dependencies"
        );
    }

    Ok(Some(DependencyOutcome {
        manifest_file: file.to_string(),
        added: merged.added,
        upgraded: merged.upgraded,
        kept: merged.kept,
    }))
}
