//! Command-line interface module
//!
//! This module handles argument parsing and output formatting.
//! It contains no business logic - that belongs in the [`crate::core`] module.

pub mod commands;
pub mod output;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::config::settings::Settings;
use commands::Commands;

/// k6foundry - Custom k6 binary builder
///
/// Builds k6 binaries bundling a set of extensions using the local Go toolchain.
#[derive(Parser, Debug)]
#[command(name = "k6foundry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Path of the configuration file
    #[arg(long, global = true, env = "K6FOUNDRY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Path of the configuration file in effect
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Settings::default_path)
    }

    /// Execute the CLI command
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let config_path = self.config_path();
        let Some(cmd) = self.command else {
            // No subcommand provided, show help
            use clap::CommandFactory;
            let mut cmd = Self::command();
            cmd.print_help()?;
            return Ok(());
        };

        let settings = match &cmd {
            Commands::Doctor { .. } => Settings::default(),
            _ => Settings::load_from_path(&config_path)
                .with_context(|| format!("Failed to load {}", config_path.display()))?,
        };

        cmd.run(&settings, &config_path, cancel).await
    }
}
