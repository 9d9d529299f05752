//! Declarative framework plugins loaded from `*.yaml` descriptors.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use rapidkit_core::application::{
    ApplicationError, PluginRegistry,
    plugins::{DeclarativePlugin, PluginDescriptor},
};

fn load_failed(path: &Path, reason: impl ToString) -> ApplicationError {
    ApplicationError::PluginLoadFailed {
        source_path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Parse one descriptor file.
pub fn load_descriptor(path: &Path) -> Result<PluginDescriptor, ApplicationError> {
    let raw = std::fs::read_to_string(path).map_err(|e| load_failed(path, e))?;
    let descriptor: PluginDescriptor =
        serde_yaml_ng::from_str(&raw).map_err(|e| load_failed(path, e))?;
    let problems = descriptor.problems();
    if !problems.is_empty() {
        return Err(load_failed(path, problems.join("; ")));
    }
    Ok(descriptor)
}

/// Register every descriptor in `dir` (sorted by file name). A missing
/// directory registers nothing. Returns the names of the new plugins.
#[instrument(skip(registry), fields(dir = %dir.display()))]
pub fn load_plugin_dir(
    dir: &Path,
    registry: &mut PluginRegistry,
) -> Result<Vec<String>, ApplicationError> {
    if !dir.is_dir() {
        debug!("No plugin directory");
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for ext in ["yaml", "yml"] {
        let pattern = dir.join(format!("*.{ext}"));
        let pattern = pattern.to_string_lossy();
        let matches = glob::glob(&pattern).map_err(|e| load_failed(dir, e))?;
        for entry in matches {
            paths.push(entry.map_err(|e| load_failed(dir, e))?);
        }
    }
    paths.sort();

    let mut loaded = Vec::new();
    for path in paths {
        let descriptor = load_descriptor(&path)?;
        let name = descriptor.name.clone();
        registry.register(Arc::new(DeclarativePlugin::new(descriptor)))?;
        debug!(plugin = %name, path = %path.display(), "Registered plugin");
        loaded.push(name);
    }
    if !loaded.is_empty() {
        info!(count = loaded.len(), "Loaded declarative plugins");
    }
    Ok(loaded)
}
