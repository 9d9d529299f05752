//! Application services - orchestrate use cases.
//!
//! Services coordinate the domain layer and ports to accomplish
//! high-level use cases like "add a module" or "merge template updates".

pub mod catalog_service;
pub mod dependency_service;
pub mod diff_service;
pub mod generator_service;
pub mod hash_service;
pub mod project_service;
pub mod snippet_service;

#[cfg(test)]
pub(crate) mod test_support;

pub use catalog_service::CatalogService;
pub use dependency_service::{DependencyOutcome, InstallPlan, plan_install};
pub use diff_service::DiffService;
pub use generator_service::{GeneratorService, GeneratorSettings, HostKind, ModuleOutcome};
pub use hash_service::{SnapshotManager, SnapshotManifest};
pub use project_service::{CreateRequest, InstallChecks, ProjectService};
pub use snippet_service::SnippetEngine;
