// ============================================================================
//  CLEAN MODULE BOUNDARIES
// ============================================================================

//! Core domain layer for RapidKit.
//!
//! Pure logic over manifests, registries and file contents. Nothing in here
//! touches the filesystem, spawns processes or renders templates; those
//! concerns sit behind the ports in `crate::application::ports`.
//!
//! ## Contents
//!
//! - **Manifests**: `module.yaml`, kits, overrides, snippet catalogs
//! - **Registries**: file hashes, snippets, installed-modules ledger
//! - **Rules**: status classification, dependency ordering, structure
//!   blueprints, ecosystem dependency merging, anchor-marker injection

pub mod common;
pub mod context;
pub mod dependency;
pub mod ecosystem;
pub mod error;
pub mod hash_registry;
pub mod kit;
pub mod ledger;
pub mod manifest;
pub mod naming;
pub mod overrides;
pub mod snippet;
pub mod staging;
pub mod status;
pub mod structure;

pub use common::{ProjectPath, content_hash, slug_basename, validate_slug};
pub use context::{ContextValue, RenderContext};
pub use dependency::ModuleGraph;
pub use error::{DomainError, ErrorCategory, ManifestError, ManifestIssue, StructureError};
pub use hash_registry::{HashRecord, HashRegistry};
pub use kit::{EssentialModule, Kit, KitFile};
pub use ledger::{
    Engine, InstalledLedger, InstalledModule, LockEntry, LockFile, ProjectContext, ProjectMetadata,
};
pub use manifest::{
    GenerationSpec, ModuleManifest, PackageDependency, Tier, VariantFile, VariantSpec, VendorFile,
    VendorSpec,
};
pub use overrides::{OverrideEntry, OverrideSpec, OverrideType};
pub use snippet::{
    ConflictResolution, Injection, InjectionFailure, SnippetCatalog, SnippetDefinition,
    SnippetRecord, SnippetRegistry, SnippetStatus,
};
pub use staging::{ArtifactKind, StagedChanges, StagedFile};
pub use status::{FileStatus, classify};
pub use structure::{
    ModuleListing, StructureBlueprint, ValidationResult, VerificationRecord,
};
