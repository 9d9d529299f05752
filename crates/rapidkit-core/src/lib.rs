//! RapidKit Core - Hexagonal Architecture Implementation
//!
//! Domain and application layers of the RapidKit module generator: render
//! catalog modules into a project, track every written file by hash, and
//! diff, merge or upgrade them later without clobbering local edits.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           rapidkit-cli (CLI)            │
//! └──────────────────┬──────────────────────┘
//!                    │ calls
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │         Application Services            │
//! │ (Generator, Diff, Project, Catalog)     │
//! └──────────────────┬──────────────────────┘
//!                    │ uses
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │      Application Ports (Traits)         │
//! │ (Filesystem, Renderer, ModuleSource)    │
//! └──────────────────┬──────────────────────┘
//!                    │ implemented by
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │    rapidkit-adapters (Infrastructure)   │
//! └─────────────────────────────────────────┘
//!
//!        Domain layer (pure logic) underneath
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rapidkit_core::prelude::*;
//!
//! let generator = Arc::new(GeneratorService::new(ports, PluginRegistry::with_builtins(), settings));
//! let mut state = ProjectState::load(fs.as_ref(), ProjectLayout::new("./my-api"))?;
//! generator.generate_module(&mut state, "free/essentials/settings", &RenderContext::new())?;
//! let diff = DiffService::new(generator).diff_module(&state, "free/essentials/settings")?;
//! ```

pub mod domain;

pub mod application;

pub mod error;

// Public API - what external crates should use
pub mod prelude {
    pub use crate::application::{
        CatalogService, CreateRequest, DiffService, GeneratorService, GeneratorSettings,
        InstallChecks, PluginRegistry, ProjectLayout, ProjectService, ProjectState,
        ports::{
            Clock, CommandRunner, Filesystem, KitSource, ManifestVerifier, MergePrompt,
            ModuleSource, ModuleValidator, Ports, TemplateRenderer,
        },
    };
    pub use crate::domain::{
        ContextValue, Engine, FileStatus, ModuleManifest, ProjectPath, RenderContext,
    };
    pub use crate::error::{RapidkitError, RapidkitResult};
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
