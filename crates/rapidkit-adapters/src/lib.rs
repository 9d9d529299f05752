//! Infrastructure adapters for RapidKit.
//!
//! This crate implements the ports defined in `rapidkit-core::application::ports`.
//! It contains all external dependencies and I/O operations.

pub mod catalog;
pub mod filesystem;
pub mod plugins;
pub mod process;
pub mod renderer;
pub mod signing;
pub mod validator;

// Re-export commonly used adapters
pub use catalog::{FsKitSource, FsModuleCatalog};
pub use filesystem::LocalFilesystem;
pub use process::SystemCommandRunner;
pub use renderer::{FallbackRenderer, SimpleRenderer, TeraRenderer};
pub use signing::ManifestSigner;
pub use validator::StructureValidator;
