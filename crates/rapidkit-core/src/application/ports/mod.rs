//! Application ports (traits) for external dependencies.
//!
//! In hexagonal architecture, ports define interfaces that the application
//! needs from the outside world. Adapters in `rapidkit-adapters` implement these.
//!
//! ## Port Types
//!
//! - **Driven (Output) Ports**: Called by application, implemented by infrastructure
//!   - `Filesystem`: File operations
//!   - `TemplateRenderer`: Template rendering
//!   - `ModuleSource` / `KitSource`: Catalog access
//!   - `ModuleValidator`: Structure checks of catalog modules
//!   - `ManifestVerifier`: Manifest signature checks
//!   - `CommandRunner`: Subprocesses with timeouts
//!   - `MergePrompt`: Interactive merge decisions
//!   - `Clock`: Current time
//!
//! - **Driving (Input) Ports**: Called by external world, implemented by application
//!   - (Defined in CLI layer, implemented by services)

use std::sync::Arc;

pub mod output;

pub use output::{
    Clock, CommandOutcome, CommandRunner, CommandSpec, Filesystem, KitSource, LoadedCatalog,
    ManifestVerifier, MergeChoice, MergePrompt, ModuleSource, ModuleValidator,
    NonInteractivePrompt, SignatureCheck, SystemClock, TemplateRenderer,
};

#[cfg(test)]
pub use output::{
    MockCommandRunner, MockFilesystem, MockManifestVerifier, MockMergePrompt,
    MockModuleValidator,
};

/// The driven ports shared by every service.
#[derive(Clone)]
pub struct Ports {
    pub fs: Arc<dyn Filesystem>,
    pub renderer: Arc<dyn TemplateRenderer>,
    pub modules: Arc<dyn ModuleSource>,
    pub commands: Arc<dyn CommandRunner>,
    pub clock: Arc<dyn Clock>,
}
