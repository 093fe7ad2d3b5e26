//! Build orchestration
//!
//! [`NativeBuilder`] assembles a custom k6 binary with the local Go toolchain:
//!
//! 1. create a workspace
//! 2. `go mod init k6`
//! 3. write `main.go`, add the base module, tidy
//! 4. for each extension: write its blank import, add it, tidy
//! 5. `go build` and copy the binary to the output
//!
//! Any failure aborts the build. The Go environment is closed and the
//! workspace removed on every path.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};

use crate::config::defaults::{DEFAULT_BASE_MODULE, LATEST_VERSION};
use crate::core::module::{normalize_version, Module};
use crate::core::platform::Platform;
use crate::core::toolchain::{self, GoToolchain};
use crate::core::workspace::Workspace;
use crate::error::BuildError;
use crate::infra::go_env::{GoEnv, GoOpts};
use crate::infra::process::Supervisor;

pub use crate::infra::process::ToolchainOutput;

/// Builds custom k6 binaries
#[async_trait]
pub trait Builder: Send + Sync {
    /// Build k6 at `base_version` for `platform`, including `extensions`
    ///
    /// `build_flags` are appended to `go build`. The binary is written to
    /// `output` only after a successful compilation.
    async fn build(
        &self,
        cancel: &CancellationToken,
        platform: &Platform,
        base_version: &str,
        extensions: &[Module],
        build_flags: &[String],
        output: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<(), BuildError>;
}

/// Options of the [`NativeBuilder`]
#[derive(Debug, Clone, PartialEq)]
pub struct NativeBuilderOpts {
    /// Go environment options
    pub go: GoOpts,
    /// Module path of the base program
    pub base_module: String,
    /// Replacement of the base module: a local checkout (`./k6`) or
    /// `module[@version]`
    pub k6_repo: Option<String>,
    /// Keep the workspace after the build
    pub skip_cleanup: bool,
    /// Directory where workspaces are created (system temp dir when unset)
    pub workspace_root: Option<PathBuf>,
    /// Where toolchain output goes
    pub output: ToolchainOutput,
}

impl Default for NativeBuilderOpts {
    fn default() -> Self {
        Self {
            go: GoOpts::default(),
            base_module: DEFAULT_BASE_MODULE.to_string(),
            k6_repo: None,
            skip_cleanup: false,
            workspace_root: None,
            output: ToolchainOutput::default(),
        }
    }
}

/// Builder shelling out to the local Go toolchain
#[derive(Debug, Clone)]
pub struct NativeBuilder {
    opts: NativeBuilderOpts,
    go: GoToolchain,
    supervisor: Supervisor,
}

impl NativeBuilder {
    /// Create a builder after checking that `go` and `git` are available
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::GoToolchainNotFound`] or [`BuildError::GitNotFound`].
    pub async fn new(opts: NativeBuilderOpts) -> Result<Self, BuildError> {
        let go = toolchain::probe_go().await?;
        toolchain::probe_git().await?;
        Ok(Self::with_toolchain(opts, go))
    }

    /// Create a builder using an already located Go toolchain
    pub fn with_toolchain(opts: NativeBuilderOpts, go: GoToolchain) -> Self {
        let supervisor = Supervisor::new(opts.output);
        Self {
            opts,
            go,
            supervisor,
        }
    }

    /// Replace the process supervisor (e.g. to shorten the kill grace period)
    #[must_use]
    pub fn with_supervisor(mut self, supervisor: Supervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    /// Base module at the requested version
    ///
    /// Semantic versions are canonicalized; anything else (a commit, a branch)
    /// is passed to the toolchain unchanged.
    fn base_module(&self, version: &str) -> Module {
        let version = if version.is_empty() {
            LATEST_VERSION.to_string()
        } else {
            normalize_version(version).unwrap_or_else(|| version.to_string())
        };
        Module::new(&self.opts.base_module, version)
    }

    async fn add_base(
        &self,
        cancel: &CancellationToken,
        env: &GoEnv,
        base: &Module,
        base_path: &str,
    ) -> Result<(), BuildError> {
        let added = match self.opts.k6_repo.as_deref() {
            Some(repo) => {
                info!(module = %base_path, replacement = %repo, "Replacing base module");
                let (replace_path, replace_version) = split_repo(repo);
                env.add_replacement(
                    cancel,
                    base_path,
                    base.pinned_version(),
                    replace_path,
                    replace_version,
                )
                .await
            }
            None => {
                info!(module = %base_path, version = %base.version, "Adding base module");
                env.add_requirement(cancel, base_path, Some(&base.version))
                    .await
            }
        };
        added.map_err(|e| e.for_module(base_path))?;

        env.tidy(cancel).await.map_err(|e| e.for_module(base_path))
    }

    async fn add_extension(
        &self,
        cancel: &CancellationToken,
        env: &GoEnv,
        workspace: &Workspace,
        extension: &Module,
    ) -> Result<(), BuildError> {
        let path = extension.versioned_path()?;
        info!(module = %path, version = %extension.version, "Adding extension");
        workspace.write_import(&path)?;

        let added = match &extension.replace {
            Some(replace) => {
                env.add_replacement(
                    cancel,
                    &path,
                    extension.pinned_version(),
                    &replace.path,
                    replace.version.as_deref(),
                )
                .await
            }
            None => {
                env.add_requirement(cancel, &path, Some(&extension.version))
                    .await
            }
        };
        added.map_err(|e| e.for_module(&extension.path))?;

        env.tidy(cancel)
            .await
            .map_err(|e| e.for_module(&extension.path))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_pipeline(
        &self,
        cancel: &CancellationToken,
        env: &GoEnv,
        workspace: &Workspace,
        base_version: &str,
        extensions: &[Module],
        build_flags: &[String],
        output: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<(), BuildError> {
        info!("Initializing build module");
        env.init(cancel).await?;

        let base = self.base_module(base_version);
        let base_path = base.versioned_path()?;
        workspace.write_main(&base_path)?;
        self.add_base(cancel, env, &base, &base_path).await?;

        for extension in extensions {
            self.add_extension(cancel, env, workspace, extension).await?;
        }

        info!("Compiling");
        let binary = workspace.binary_path();
        env.compile(cancel, &binary, build_flags).await?;
        info!("Build complete");

        let mut file = tokio::fs::File::open(&binary)
            .await
            .map_err(|source| BuildError::Output { source })?;
        tokio::io::copy(&mut file, &mut *output)
            .await
            .map_err(|source| BuildError::Output { source })?;
        output
            .flush()
            .await
            .map_err(|source| BuildError::Output { source })
    }
}

#[async_trait]
impl Builder for NativeBuilder {
    async fn build(
        &self,
        cancel: &CancellationToken,
        platform: &Platform,
        base_version: &str,
        extensions: &[Module],
        build_flags: &[String],
        output: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<(), BuildError> {
        let workspace = Workspace::create(
            self.opts.workspace_root.as_deref(),
            self.opts.skip_cleanup,
        )?;
        let span = tracing::info_span!(
            "build",
            workspace = %workspace.path().display(),
            platform = %platform,
        );

        async move {
            let env = GoEnv::new(
                &self.go.path,
                workspace.path(),
                &self.opts.go,
                platform,
                self.supervisor.clone(),
            )
            .map_err(|source| BuildError::Workspace {
                path: workspace.path().to_path_buf(),
                source,
            })?;

            let result = self
                .run_pipeline(
                    cancel,
                    &env,
                    &workspace,
                    base_version,
                    extensions,
                    build_flags,
                    output,
                )
                .await;

            env.close().await;
            result
        }
        .instrument(span)
        .await
    }
}

/// Split a base replacement into path and optional version
///
/// Local paths never carry a version.
fn split_repo(repo: &str) -> (&str, Option<&str>) {
    if repo.starts_with('.') || repo.starts_with('/') {
        return (repo, None);
    }
    match repo.split_once('@') {
        Some((path, version)) => (path, Some(version)),
        None => (repo, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_repo() {
        assert_eq!(split_repo("../k6"), ("../k6", None));
        assert_eq!(split_repo("/src/k6@x"), ("/src/k6@x", None));
        assert_eq!(
            split_repo("github.com/fork/k6@v0.50.0"),
            ("github.com/fork/k6", Some("v0.50.0"))
        );
        assert_eq!(split_repo("github.com/fork/k6"), ("github.com/fork/k6", None));
    }

    #[test]
    fn test_default_opts_use_k6() {
        let opts = NativeBuilderOpts::default();
        assert_eq!(opts.base_module, "go.k6.io/k6");
        assert_eq!(opts.output, ToolchainOutput::Capture);
    }

    #[cfg(unix)]
    mod pipeline {
        use super::*;
        use crate::core::module::Module;
        use crate::error::{ErrorKind, Step};
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;
        use std::time::Duration;

        /// `go` stand-in logging its arguments; `go build -o <out>` writes a
        /// fake binary and `fail_on` makes matching commands exit 1
        fn fake_go(dir: &Path, fail_on: &str) -> (GoToolchain, PathBuf) {
            let log = dir.join("calls.log");
            let script = dir.join("go");
            std::fs::write(
                &script,
                format!(
                    r#"#!/bin/sh
echo "$*" >> '{log}'
case "$*" in
  {fail_on}) echo "go: command failed" >&2; exit 1 ;;
esac
if [ "$1" = "build" ]; then echo "fake k6 binary" > "$3"; fi
exit 0
"#,
                    log = log.display(),
                ),
            )
            .unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

            let go = GoToolchain {
                path: script,
                version: "1.22.1".to_string(),
                platform: None,
            };
            (go, log)
        }

        fn calls(log: &Path) -> Vec<String> {
            std::fs::read_to_string(log)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }

        fn builder(go: GoToolchain, root: &Path, skip_cleanup: bool) -> NativeBuilder {
            let opts = NativeBuilderOpts {
                skip_cleanup,
                workspace_root: Some(root.to_path_buf()),
                ..NativeBuilderOpts::default()
            };
            NativeBuilder::with_toolchain(opts, go)
        }

        fn workspaces(root: &Path) -> Vec<PathBuf> {
            std::fs::read_dir(root)
                .unwrap()
                .map(|e| e.unwrap().path())
                .collect()
        }

        #[tokio::test]
        async fn test_pipeline_order() {
            let tools = tempfile::TempDir::new().unwrap();
            let root = tempfile::TempDir::new().unwrap();
            let (go, log) = fake_go(tools.path(), "never");
            let builder = builder(go, root.path(), false);

            let extensions = vec![
                Module::new("go.k6.io/k6ext", "v0.1.0"),
                Module::new("go.k6.io/k6ext", "v2.0.0"),
                Module::new("go.k6.io/local", "latest").with_replace("/src/local", None),
            ];
            let mut output = Vec::new();
            builder
                .build(
                    &CancellationToken::new(),
                    &Platform::new("linux", "amd64"),
                    "v0.1",
                    &extensions,
                    &["-ldflags=-s".to_string()],
                    &mut output,
                )
                .await
                .unwrap();

            assert_eq!(output, b"fake k6 binary\n");
            let calls = calls(&log);
            assert_eq!(calls.len(), 10);
            assert_eq!(calls[0], "mod init k6");
            assert_eq!(calls[1], "mod edit -require go.k6.io/k6@v0.1.0");
            assert_eq!(calls[2], "mod tidy -compat=1.17");
            assert_eq!(calls[3], "mod edit -require go.k6.io/k6ext@v0.1.0");
            assert_eq!(calls[4], "mod tidy -compat=1.17");
            assert_eq!(calls[5], "mod edit -require go.k6.io/k6ext/v2@v2.0.0");
            assert_eq!(calls[6], "mod tidy -compat=1.17");
            assert_eq!(calls[7], "mod edit -replace go.k6.io/local=/src/local");
            assert_eq!(calls[8], "mod tidy -compat=1.17");
            assert!(calls[9].starts_with("build -o "));
            assert!(calls[9].ends_with("/k6 -trimpath -ldflags=-s"));

            assert!(workspaces(root.path()).is_empty());
        }

        #[tokio::test]
        async fn test_kept_workspace_contents() {
            let tools = tempfile::TempDir::new().unwrap();
            let root = tempfile::TempDir::new().unwrap();
            let (go, _) = fake_go(tools.path(), "never");
            let builder = builder(go, root.path(), true);

            let mut output = Vec::new();
            builder
                .build(
                    &CancellationToken::new(),
                    &Platform::new("linux", "amd64"),
                    "v2.0.0",
                    &[Module::new("go.k6.io/k6ext", "v2.1.0")],
                    &[],
                    &mut output,
                )
                .await
                .unwrap();

            let kept = workspaces(root.path());
            assert_eq!(kept.len(), 1);
            let main = std::fs::read_to_string(kept[0].join("main.go")).unwrap();
            assert!(main.contains("\"go.k6.io/k6/v2/cmd\""));
            let import = std::fs::read_to_string(kept[0].join("go.k6.io_k6ext_v2.go")).unwrap();
            assert!(import.contains("import _ \"go.k6.io/k6ext/v2\""));
        }

        #[tokio::test]
        async fn test_base_replacement() {
            let tools = tempfile::TempDir::new().unwrap();
            let root = tempfile::TempDir::new().unwrap();
            let (go, log) = fake_go(tools.path(), "never");
            let mut builder = builder(go, root.path(), false);
            builder.opts.k6_repo = Some("github.com/fork/k6@v0.50.0".to_string());

            let mut output = Vec::new();
            builder
                .build(
                    &CancellationToken::new(),
                    &Platform::new("linux", "amd64"),
                    "latest",
                    &[],
                    &[],
                    &mut output,
                )
                .await
                .unwrap();

            assert_eq!(
                calls(&log)[1],
                "mod edit -replace go.k6.io/k6=github.com/fork/k6@v0.50.0"
            );
        }

        #[tokio::test]
        async fn test_dependency_failure_aborts_and_cleans_up() {
            let tools = tempfile::TempDir::new().unwrap();
            let root = tempfile::TempDir::new().unwrap();
            let (go, log) = fake_go(tools.path(), "\"mod tidy\"*");
            let builder = builder(go, root.path(), false);

            let mut output = Vec::new();
            let err = builder
                .build(
                    &CancellationToken::new(),
                    &Platform::new("linux", "amd64"),
                    "v0.3.0",
                    &[Module::new("go.k6.io/k6ext", "v0.1.0")],
                    &[],
                    &mut output,
                )
                .await
                .unwrap_err();

            assert_eq!(err.kind(), ErrorKind::Dependency);
            match &err {
                BuildError::Dependency { module, step, .. } => {
                    assert_eq!(module.as_deref(), Some("go.k6.io/k6"));
                    assert_eq!(*step, Step::Tidy);
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert!(output.is_empty());
            assert_eq!(calls(&log).len(), 3);
            assert!(workspaces(root.path()).is_empty());
        }

        #[tokio::test]
        async fn test_compile_failure() {
            let tools = tempfile::TempDir::new().unwrap();
            let root = tempfile::TempDir::new().unwrap();
            let (go, _) = fake_go(tools.path(), "build*");
            let builder = builder(go, root.path(), false);

            let mut output = Vec::new();
            let err = builder
                .build(
                    &CancellationToken::new(),
                    &Platform::new("linux", "amd64"),
                    "latest",
                    &[],
                    &[],
                    &mut output,
                )
                .await
                .unwrap_err();

            assert_eq!(err.kind(), ErrorKind::Compile);
            assert!(err.to_string().contains("failed"));
            assert!(output.is_empty());
        }

        #[tokio::test]
        async fn test_conflicting_extension_version() {
            let tools = tempfile::TempDir::new().unwrap();
            let root = tempfile::TempDir::new().unwrap();
            let (go, _) = fake_go(tools.path(), "never");
            let builder = builder(go, root.path(), false);

            let mut output = Vec::new();
            let err = builder
                .build(
                    &CancellationToken::new(),
                    &Platform::new("linux", "amd64"),
                    "latest",
                    &[Module::new("go.k6.io/k6ext/v2", "v3.0.0")],
                    &[],
                    &mut output,
                )
                .await
                .unwrap_err();

            assert_eq!(err.kind(), ErrorKind::InvalidInput);
            assert!(workspaces(root.path()).is_empty());
        }

        #[tokio::test]
        async fn test_cancelled_build() {
            let tools = tempfile::TempDir::new().unwrap();
            let root = tempfile::TempDir::new().unwrap();
            let (go, log) = fake_go(tools.path(), "never");
            let builder = builder(go, root.path(), false);
            let cancel = CancellationToken::new();
            cancel.cancel();

            let mut output = Vec::new();
            let err = builder
                .build(
                    &cancel,
                    &Platform::new("linux", "amd64"),
                    "latest",
                    &[],
                    &[],
                    &mut output,
                )
                .await
                .unwrap_err();

            assert!(err.is_cancelled(), "{err:?}");
            assert!(!log.exists());
            assert!(workspaces(root.path()).is_empty());
        }

        #[tokio::test]
        async fn test_cancelled_during_tidy() {
            let tools = tempfile::TempDir::new().unwrap();
            let root = tempfile::TempDir::new().unwrap();
            let log = tools.path().join("calls.log");
            let script = tools.path().join("go");
            std::fs::write(
                &script,
                format!(
                    "#!/bin/sh\necho \"$*\" >> '{}'\ncase \"$*\" in\n  \"mod tidy\"*) exec sleep 30 ;;\nesac\nexit 0\n",
                    log.display()
                ),
            )
            .unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
            let go = GoToolchain {
                path: script,
                version: "1.22.1".to_string(),
                platform: None,
            };
            let builder = builder(go, root.path(), false)
                .with_supervisor(Supervisor::default().with_grace_period(Duration::from_millis(100)));

            let cancel = CancellationToken::new();
            let canceller = {
                let cancel = cancel.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    // cancel once tidy is running
                    while !std::fs::read_to_string(&log)
                        .unwrap_or_default()
                        .contains("mod tidy")
                    {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                    }
                    cancel.cancel();
                })
            };

            let started = std::time::Instant::now();
            let mut output = Vec::new();
            let err = builder
                .build(
                    &cancel,
                    &Platform::new("linux", "amd64"),
                    "latest",
                    &[],
                    &[],
                    &mut output,
                )
                .await
                .unwrap_err();
            canceller.abort();

            assert!(started.elapsed() < Duration::from_secs(10));
            assert!(
                matches!(
                    err,
                    BuildError::Cancelled {
                        step: Step::Tidy,
                        ..
                    }
                ),
                "{err:?}"
            );
            assert!(output.is_empty());
            assert_eq!(calls(&log).last().unwrap(), "mod tidy -compat=1.17");
            assert!(workspaces(root.path()).is_empty());
        }
    }
}
