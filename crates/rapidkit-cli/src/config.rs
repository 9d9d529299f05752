//! Application configuration.
//!
//! [`AppConfig`] is loaded once at startup and passed down by value. The
//! CLI layer owns config; the core crate only sees the pieces handed to it
//! through `GeneratorSettings` and the adapter constructors.
//!
//! # Resolution order (highest priority first)
//!
//! 1. CLI flags (`--modules-root`, `--kits-root`; applied by the caller)
//! 2. `RAPIDKIT_*` environment variables, nested keys joined with `__`
//!    (`RAPIDKIT_RENDERER__ENGINE=simple`)
//! 3. An explicit `--config` file
//! 4. `rapidkit.toml` in the working directory
//! 5. The user config file (`config.toml` in the platform config dir)
//! 6. Built-in defaults

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// File name of the project-local configuration.
pub const PROJECT_CONFIG_FILE: &str = "rapidkit.toml";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Module catalog root.
    pub modules_root: PathBuf,
    /// Kit catalog root.
    pub kits_root: PathBuf,
    /// Directory of declarative plugin descriptors.
    pub plugins_dir: Option<PathBuf>,
    /// Shared vendor cache outside projects.
    pub vendor_root: Option<PathBuf>,
    pub telemetry: bool,
    pub renderer: RendererConfig,
    pub generation: GenerationConfig,
    pub timeouts: TimeoutConfig,
    pub snapshots: SnapshotConfig,
    pub logging: LoggingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererEngine {
    #[default]
    Tera,
    Simple,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub engine: RendererEngine,
    /// Retry with the simple renderer when the engine fails for a reason
    /// other than an undefined variable.
    pub allow_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub check_requirements: bool,
    /// Structure blueprint; `<modules_root>/structure.yaml` when unset.
    pub blueprint: Option<PathBuf>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            check_requirements: true,
            blueprint: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub package_manager_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            package_manager_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub keep: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { keep: 10 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write logs to this file.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub no_color: bool,
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            no_color: false,
            format: "auto".into(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            modules_root: PathBuf::from("modules"),
            kits_root: PathBuf::from("kits"),
            plugins_dir: None,
            vendor_root: None,
            telemetry: true,
            renderer: RendererConfig::default(),
            generation: GenerationConfig::default(),
            timeouts: TimeoutConfig::default(),
            snapshots: SnapshotConfig::default(),
            logging: LoggingConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from every layer.
    ///
    /// `config_file` is the path the user passed via `--config`; unlike the
    /// other files it must exist.
    pub fn load(config_file: Option<&PathBuf>) -> anyhow::Result<Self> {
        Self::load_from(
            Some(Self::config_path()),
            Path::new(PROJECT_CONFIG_FILE),
            config_file.map(PathBuf::as_path),
            Environment::with_prefix("RAPIDKIT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
    }

    fn load_from(
        user_file: Option<PathBuf>,
        project_file: &Path,
        explicit: Option<&Path>,
        env: Environment,
    ) -> anyhow::Result<Self> {
        let mut builder = Config::builder().add_source(
            Config::try_from(&Self::default()).context("Failed to encode default configuration")?,
        );
        if let Some(user_file) = user_file {
            builder = builder.add_source(File::from(user_file).required(false));
        }
        builder = builder.add_source(File::from(project_file).required(false));
        if let Some(explicit) = explicit {
            builder = builder.add_source(File::from(explicit).required(true));
        }

        builder
            .add_source(env)
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Path to the user configuration file.
    ///
    /// Uses `directories::ProjectDirs` for cross-platform correctness,
    /// falling back to `.rapidkit.toml` in the current directory.
    pub fn config_path() -> PathBuf {
        directories::ProjectDirs::from("dev", "rapidkit", "rapidkit")
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".rapidkit.toml"))
    }

    /// Blueprint file used by the structure validator; defaults to
    /// `structure.yaml` in the effective modules root.
    pub fn blueprint_path(&self, modules_root: &Path) -> PathBuf {
        self.generation
            .blueprint
            .clone()
            .unwrap_or_else(|| modules_root.join("structure.yaml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    use tempfile::TempDir;

    fn no_env() -> Environment {
        Environment::with_prefix("RAPIDKIT")
            .prefix_separator("_")
            .separator("__")
            .source(Some(HashMap::new()))
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.timeouts.package_manager_secs, 300);
        assert_eq!(cfg.snapshots.keep, 10);
        assert_eq!(cfg.renderer.engine, RendererEngine::Tera);
        assert!(!cfg.renderer.allow_fallback);
        assert!(cfg.generation.check_requirements);
    }

    #[test]
    fn load_without_files_returns_defaults() {
        let temp = TempDir::new().unwrap();
        let cfg = AppConfig::load_from(None, &temp.path().join("rapidkit.toml"), None, no_env())
            .unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn explicit_file_beats_project_file() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("rapidkit.toml");
        fs::write(&project, "modules_root = \"catalog\"\n[snapshots]\nkeep = 3\n").unwrap();
        let explicit = temp.path().join("ci.toml");
        fs::write(&explicit, "[snapshots]\nkeep = 1\n[renderer]\nengine = \"simple\"\n").unwrap();

        let cfg = AppConfig::load_from(None, &project, Some(&explicit), no_env()).unwrap();
        assert_eq!(cfg.modules_root, PathBuf::from("catalog"));
        assert_eq!(cfg.snapshots.keep, 1);
        assert_eq!(cfg.renderer.engine, RendererEngine::Simple);
    }

    #[test]
    fn environment_overrides_nested_keys() {
        let temp = TempDir::new().unwrap();
        let env = Environment::with_prefix("RAPIDKIT")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(Some(HashMap::from([
                ("RAPIDKIT_TELEMETRY".to_string(), "false".to_string()),
                ("RAPIDKIT_RENDERER__ALLOW_FALLBACK".to_string(), "true".to_string()),
            ])));
        let cfg = AppConfig::load_from(None, &temp.path().join("none.toml"), None, env).unwrap();
        assert!(!cfg.telemetry);
        assert!(cfg.renderer.allow_fallback);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.toml");
        assert!(
            AppConfig::load_from(None, &temp.path().join("none.toml"), Some(&missing), no_env())
                .is_err()
        );
    }

    #[test]
    fn blueprint_defaults_under_modules_root() {
        let mut cfg = AppConfig::default();
        assert_eq!(
            cfg.blueprint_path(&cfg.modules_root),
            PathBuf::from("modules/structure.yaml")
        );
        assert_eq!(
            cfg.blueprint_path(Path::new("/catalog")),
            PathBuf::from("/catalog/structure.yaml")
        );
        cfg.generation.blueprint = Some(PathBuf::from("custom.yaml"));
        assert_eq!(cfg.blueprint_path(Path::new("/catalog")), PathBuf::from("custom.yaml"));
    }
}
