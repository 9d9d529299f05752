//! Application layer for RapidKit.
//!
//! This layer contains:
//! - **Services**: Use case orchestration (generator, diff/merge, lifecycle)
//! - **Ports**: Interface definitions (traits) for external dependencies
//! - **Plugins**: Framework plugin registry
//! - **State**: Project registries loaded for one operation
//! - **Errors**: Application-specific error types
//!
//! The application layer coordinates the domain layer but contains no
//! business logic itself. All business rules live in `crate::domain`.

pub mod error;
pub mod layout;
pub mod plugins;
pub mod ports;
pub mod reports;
pub mod services;
pub mod state;

pub use services::{
    CatalogService, CreateRequest, DiffService, GeneratorService, GeneratorSettings,
    InstallChecks, ProjectService, SnippetEngine,
};

// Re-export port traits (for adapter implementation)
pub use ports::{
    Clock, CommandRunner, Filesystem, KitSource, ManifestVerifier, MergePrompt, ModuleSource,
    ModuleValidator, Ports, SignatureCheck, TemplateRenderer,
};

pub use error::ApplicationError;
pub use layout::ProjectLayout;
pub use plugins::{FrameworkPlugin, PluginRegistry};
pub use state::ProjectState;
