//! k6foundry - Custom k6 binary builder
//!
//! Builds k6 binaries that bundle extensions by generating a throwaway Go
//! module and compiling it with the local Go toolchain.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Module references, workspace and build pipeline
//! - [`infra`] - Infrastructure layer (filesystem, processes, go environment)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling
//!
//! # Example
//!
//! ```no_run
//! use k6foundry::core::builder::{Builder, NativeBuilder, NativeBuilderOpts};
//! use k6foundry::core::module::Module;
//! use k6foundry::core::platform::Platform;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let builder = NativeBuilder::new(NativeBuilderOpts::default()).await?;
//! let extensions = vec![Module::parse("github.com/grafana/xk6-sql@v0.4")?];
//! let mut binary = Vec::new();
//! builder
//!     .build(
//!         &CancellationToken::new(),
//!         &Platform::runtime(),
//!         "v0.50.0",
//!         &extensions,
//!         &[],
//!         &mut binary,
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
