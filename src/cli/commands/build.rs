//! Build command implementation
//!
//! Implements `k6foundry build` to assemble a custom k6 binary.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cli::output::{create_spinner, print_success};
use crate::config::defaults::{DEFAULT_BASE_VERSION, DEFAULT_OUTPUT};
use crate::config::settings::Settings;
use crate::core::builder::{Builder, NativeBuilder, NativeBuilderOpts, ToolchainOutput};
use crate::core::module::Module;
use crate::core::platform::Platform;
use crate::infra::filesystem::set_executable;

pub(crate) const LONG_ABOUT: &str = "\
Builds a custom k6 binary with extensions.

Extensions use the go module format: path[@version][=replace[@version]]

The module path must follow go conventions (e.g. github.com/my-module).
If the version is omitted, 'latest' is used.
The replacement can be a module path or a relative path (e.g. ../my-module).
A relative replacement path cannot have a version.";

pub(crate) const EXAMPLES: &str = "\
Examples:
  # build k6 v0.50.0 with the latest version of xk6-kubernetes
  k6foundry build -v v0.50.0 -d github.com/grafana/xk6-kubernetes

  # build k6 v0.49.0 with xk6-kubernetes v0.9.0 and xk6-output-kafka v0.7.0
  k6foundry build -v v0.49.0 -d github.com/grafana/xk6-kubernetes@v0.9.0 \\
      -d github.com/grafana/xk6-output-kafka@v0.7.0

  # build the latest k6 replacing xk6-kubernetes with a local module
  k6foundry build -d github.com/grafana/xk6-kubernetes=../xk6-kubernetes

  # build k6 from a local repository
  k6foundry build -r ../k6";

/// Build options
#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// Extension to include: path[@version][=replace[@version]] (repeatable)
    #[arg(short = 'd', long = "dependency", value_name = "DEPENDENCY")]
    pub dependencies: Vec<Module>,

    /// k6 version
    #[arg(short = 'v', long, default_value = DEFAULT_BASE_VERSION)]
    pub k6_version: String,

    /// Build k6 from this repository: a local path or module[@version]
    #[arg(short = 'r', long = "k6-repository", value_name = "REPOSITORY")]
    pub k6_repository: Option<String>,

    /// Target platform as os/arch (defaults to the host)
    #[arg(short, long)]
    pub platform: Option<Platform>,

    /// Path of the output binary
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Extra `go build` flags, e.g. -b=-ldflags='-w -s' (repeatable)
    #[arg(short = 'b', long = "build-opts", value_name = "FLAG", allow_hyphen_values = true)]
    pub build_opts: Vec<String>,

    /// Copy the current environment into go commands
    #[arg(long)]
    pub copy_env: bool,

    /// Stream Go toolchain output
    #[arg(long)]
    pub verbose: bool,

    /// Build with the race detector (enables cgo)
    #[arg(long)]
    pub race: bool,

    /// Keep the build workspace
    #[arg(long)]
    pub skip_cleanup: bool,

    /// Use a throwaway module and build cache
    #[arg(long)]
    pub ephemeral_cache: bool,

    /// GOPROXY for the build
    #[arg(long, env = "K6FOUNDRY_GOPROXY")]
    pub go_proxy: Option<String>,

    /// GONOPROXY for the build
    #[arg(long, env = "K6FOUNDRY_GONOPROXY")]
    pub go_noproxy: Option<String>,

    /// GOPRIVATE for the build
    #[arg(long, env = "K6FOUNDRY_GOPRIVATE")]
    pub go_private: Option<String>,

    /// Timeout for resolving modules, in seconds
    #[arg(long, value_name = "SECONDS")]
    pub get_timeout: Option<u64>,

    /// Timeout for compiling, in seconds
    #[arg(long, value_name = "SECONDS")]
    pub build_timeout: Option<u64>,
}

impl BuildArgs {
    /// Builder options: config file values overridden by flags
    pub fn builder_opts(&self, settings: &Settings) -> NativeBuilderOpts {
        let mut opts = settings.builder_opts();

        opts.k6_repo = self.k6_repository.clone().or(opts.k6_repo);
        opts.skip_cleanup |= self.skip_cleanup;
        if self.verbose {
            opts.output = ToolchainOutput::Inherit;
        }

        let go = &mut opts.go;
        go.copy_env |= self.copy_env;
        go.race_detector |= self.race;
        go.ephemeral_cache |= self.ephemeral_cache;
        if let Some(proxy) = &self.go_proxy {
            go.go_proxy = Some(proxy.clone());
        }
        if let Some(no_proxy) = &self.go_noproxy {
            go.go_no_proxy = Some(no_proxy.clone());
        }
        if let Some(private) = &self.go_private {
            go.go_private = Some(private.clone());
        }
        if let Some(secs) = self.get_timeout {
            go.get_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = self.build_timeout {
            go.build_timeout = Some(Duration::from_secs(secs));
        }

        opts
    }
}

/// Execute the build command
pub async fn execute(args: BuildArgs, settings: &Settings, cancel: CancellationToken) -> Result<()> {
    let platform = args.platform.clone().unwrap_or_else(Platform::runtime);
    let opts = args.builder_opts(settings);
    let show_spinner = opts.output == ToolchainOutput::Capture;

    let builder = NativeBuilder::new(opts)
        .await
        .context("Cannot build k6")?;

    tracing::info!(
        platform = %platform,
        k6_version = %args.k6_version,
        extensions = args.dependencies.len(),
        "Building k6"
    );

    // the binary only appears at its final path once the build succeeded
    let output_dir = output_dir(&args.output);
    let staged = tempfile::Builder::new()
        .prefix(".k6foundry")
        .tempfile_in(output_dir)
        .with_context(|| format!("Failed to create output in {}", output_dir.display()))?;
    let mut file = tokio::fs::File::from_std(
        staged
            .reopen()
            .context("Failed to open staged output")?,
    );

    let spinner = show_spinner.then(|| create_spinner(&format!("Building k6 for {platform}...")));
    let result = builder
        .build(
            &cancel,
            &platform,
            &args.k6_version,
            &args.dependencies,
            &args.build_opts,
            &mut file,
        )
        .await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    result.context("Build failed")?;
    drop(file);

    set_executable(staged.path()).context("Failed to make output executable")?;
    staged
        .persist(&args.output)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    print_success(&format!("Built {}", args.output.display()));
    Ok(())
}

fn output_dir(output: &Path) -> &Path {
    output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::cli::commands::Commands;
    use clap::Parser;

    fn parse(args: &[&str]) -> BuildArgs {
        let mut argv = vec!["k6foundry", "build"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Some(Commands::Build(args)) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.k6_version, "latest");
        assert_eq!(args.output, PathBuf::from("k6"));
        assert!(args.dependencies.is_empty());
        assert!(args.platform.is_none());
    }

    #[test]
    fn test_parse_dependencies_and_platform() {
        let args = parse(&[
            "-v",
            "v0.50.0",
            "-d",
            "github.com/grafana/xk6-kubernetes@v0.9",
            "--dependency",
            "github.com/grafana/xk6-sql=../xk6-sql",
            "-p",
            "linux/arm64",
            "-b",
            "-ldflags=-w -s",
        ]);
        assert_eq!(args.k6_version, "v0.50.0");
        assert_eq!(args.dependencies.len(), 2);
        assert_eq!(args.dependencies[0].version, "v0.9.0");
        assert!(args.dependencies[1].replace.as_ref().unwrap().is_local());
        assert_eq!(args.platform, Some(Platform::new("linux", "arm64")));
        assert_eq!(args.build_opts, vec!["-ldflags=-w -s"]);
    }

    #[test]
    fn test_invalid_dependency_rejected() {
        let result = Cli::try_parse_from(["k6foundry", "build", "-d", "github.com/x=./y@v1.0.0"]);
        assert!(result.is_err());

        let result = Cli::try_parse_from(["k6foundry", "build", "-d", "go.k6.io/k6ext/v2@v3.0.0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_platform_rejected() {
        let result = Cli::try_parse_from(["k6foundry", "build", "-p", "linux"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_flags_override_settings() {
        let mut settings = Settings::default();
        settings.go.proxy = Some("https://proxy.example.com".to_string());
        settings.go.get_timeout_secs = Some(30);

        let args = parse(&[
            "--go-proxy",
            "direct",
            "--copy-env",
            "--race",
            "--verbose",
            "--build-timeout",
            "600",
            "-r",
            "../k6",
        ]);
        let opts = args.builder_opts(&settings);

        assert_eq!(opts.go.go_proxy.as_deref(), Some("direct"));
        assert_eq!(opts.go.get_timeout, Some(Duration::from_secs(30)));
        assert_eq!(opts.go.build_timeout, Some(Duration::from_secs(600)));
        assert!(opts.go.copy_env);
        assert!(opts.go.race_detector);
        assert_eq!(opts.output, ToolchainOutput::Inherit);
        assert_eq!(opts.k6_repo.as_deref(), Some("../k6"));
    }

    #[test]
    fn test_output_dir() {
        assert_eq!(output_dir(Path::new("k6")), Path::new("."));
        assert_eq!(output_dir(Path::new("bin/k6")), Path::new("bin"));
    }
}
