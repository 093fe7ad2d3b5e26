//! User configuration
//!
//! Reads optional settings from `config.toml` in the k6foundry config directory.
//! The file location can be overridden with `K6FOUNDRY_CONFIG`.
//!
//! ```toml
//! [go]
//! proxy = "https://proxy.golang.org,direct"
//! copy_env = true
//! get_timeout_secs = 300
//!
//! [build]
//! skip_cleanup = false
//! ephemeral_cache = true
//! ```
//!
//! Command-line flags always take precedence over values read here.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::config::defaults::DEFAULT_BASE_MODULE;
use crate::core::builder::{NativeBuilderOpts, ToolchainOutput};
use crate::infra::go_env::GoOpts;

/// Environment variable overriding the config file location
pub const ENV_CONFIG_FILE: &str = "K6FOUNDRY_CONFIG";

/// Application name used in directory paths
const APP_NAME: &str = "k6foundry";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    ReadError { path: String, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    ParseError { path: String, error: String },
}

/// Settings loaded from the config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Go toolchain settings
    #[serde(default)]
    pub go: GoSettings,

    /// Build settings
    #[serde(default)]
    pub build: BuildSettings,
}

/// Go toolchain settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoSettings {
    /// Copy the current process environment into every go command
    pub copy_env: Option<bool>,
    /// Enable cgo
    pub cgo: Option<bool>,
    /// GOCACHE
    pub cache: Option<String>,
    /// GOMODCACHE
    pub mod_cache: Option<String>,
    /// GOPROXY
    pub proxy: Option<String>,
    /// GONOPROXY
    pub no_proxy: Option<String>,
    /// GOPRIVATE
    pub private: Option<String>,
    /// Timeout in seconds for commands that resolve modules
    pub get_timeout_secs: Option<u64>,
    /// Timeout in seconds for `go build`
    pub build_timeout_secs: Option<u64>,
    /// Build with the race detector
    pub race_detector: Option<bool>,
}

/// Build settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSettings {
    /// Module path of the base program
    pub base_module: Option<String>,
    /// Keep the workspace after the build
    pub skip_cleanup: Option<bool>,
    /// Use a throwaway module and build cache per build
    pub ephemeral_cache: Option<bool>,
    /// Stream toolchain output to the terminal
    pub verbose: Option<bool>,
    /// Directory where workspaces are created
    pub workspace_root: Option<PathBuf>,
}

impl Settings {
    /// Default location of the config file
    ///
    /// `$K6FOUNDRY_CONFIG` if set, otherwise `<config dir>/k6foundry/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        if let Ok(path) = env::var(ENV_CONFIG_FILE) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".config").join(APP_NAME))
                    .unwrap_or_else(|| PathBuf::from(".").join(".config").join(APP_NAME))
            })
            .join("config.toml")
    }

    /// Load settings from a specific path
    ///
    /// A missing file yields the default settings.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Go options described by these settings
    #[must_use]
    pub fn go_opts(&self) -> GoOpts {
        let go = &self.go;
        GoOpts {
            copy_env: go.copy_env.unwrap_or(false),
            cgo: go.cgo.unwrap_or(false),
            go_cache: go.cache.clone(),
            go_mod_cache: go.mod_cache.clone(),
            go_proxy: go.proxy.clone(),
            go_no_proxy: go.no_proxy.clone(),
            go_private: go.private.clone(),
            get_timeout: go.get_timeout_secs.map(Duration::from_secs),
            build_timeout: go.build_timeout_secs.map(Duration::from_secs),
            race_detector: go.race_detector.unwrap_or(false),
            ephemeral_cache: self.build.ephemeral_cache.unwrap_or(false),
        }
    }

    /// Builder options described by these settings
    #[must_use]
    pub fn builder_opts(&self) -> NativeBuilderOpts {
        let build = &self.build;
        NativeBuilderOpts {
            go: self.go_opts(),
            base_module: build
                .base_module
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_MODULE.to_string()),
            k6_repo: None,
            skip_cleanup: build.skip_cleanup.unwrap_or(false),
            workspace_root: build.workspace_root.clone(),
            output: if build.verbose.unwrap_or(false) {
                ToolchainOutput::Inherit
            } else {
                ToolchainOutput::Capture
            },
        }
    }
}
