//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod doctor;
pub mod version;

use anyhow::Result;
use clap::Subcommand;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::config::settings::Settings;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a custom k6 binary with extensions
    #[command(long_about = build::LONG_ABOUT, after_help = build::EXAMPLES)]
    Build(build::BuildArgs),

    /// Show version information
    Version,

    /// Check that the Go toolchain and git are available
    Doctor {
        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    /// Run the command
    pub async fn run(
        self,
        settings: &Settings,
        config_path: &Path,
        cancel: CancellationToken,
    ) -> Result<()> {
        match self {
            Self::Build(args) => build::execute(args, settings, cancel).await,
            Self::Version => version::execute().await,
            Self::Doctor { json } => doctor::execute(config_path, json).await,
        }
    }
}
