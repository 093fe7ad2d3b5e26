//! Core business logic module
//!
//! Module references, the build workspace and the build pipeline. External
//! commands and filesystem writes go through [`crate::infra`].
//!
//! # Submodules
//!
//! - [`module`] - Dependency specifications and versioned import paths
//! - [`module_path`] - Go module path validation
//! - [`platform`] - Target platform (`os/arch`)
//! - [`builder`] - Build orchestration
//! - [`workspace`] - Temporary build workspace
//! - [`templates`] - Generated Go sources
//! - [`toolchain`] - Go and git prerequisites

pub mod builder;
pub mod module;
pub mod module_path;
pub mod platform;
pub mod templates;
pub mod toolchain;
pub mod workspace;
