//! Go build environment
//!
//! Composes the environment of the `go` command for one build and exposes one
//! operation per manifest step of the build module. Every command goes through
//! the [`Supervisor`] with the timeout of its class:
//!
//! | Operation          | Command                                  | Timeout          |
//! |--------------------|------------------------------------------|------------------|
//! | `init`             | `go mod init k6`                         | fixed, 10s       |
//! | `add_requirement`  | `go mod edit -require path@version`      | `get_timeout`    |
//! | `add_replacement`  | `go mod edit -replace old=new`           | `get_timeout`    |
//! | `tidy`             | `go mod tidy -compat=1.17`               | `get_timeout`    |
//! | `compile`          | `go build -o out -trimpath [-race] ...`  | `build_timeout`  |

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::env;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::defaults::{
    BUILD_MODULE_NAME, CACHE_CLEAN_TIMEOUT, EPHEMERAL_CACHE_PREFIX, INIT_TIMEOUT, LATEST_VERSION,
    TIDY_COMPAT,
};
use crate::core::platform::Platform;
use crate::error::{BuildError, Step};
use crate::infra::process::{Invocation, Supervisor};

/// Options of the Go build environment
///
/// Unset values leave the corresponding variable to the inherited environment
/// (when `copy_env` is enabled) or to the Go defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoOpts {
    /// Start from the environment of the current process
    pub copy_env: bool,
    /// Enable cgo (`CGO_ENABLED=1`)
    pub cgo: bool,
    /// `GOCACHE`
    pub go_cache: Option<String>,
    /// `GOMODCACHE`
    pub go_mod_cache: Option<String>,
    /// `GOPROXY`
    pub go_proxy: Option<String>,
    /// `GONOPROXY`
    pub go_no_proxy: Option<String>,
    /// `GOPRIVATE`
    pub go_private: Option<String>,
    /// Timeout of commands that resolve modules (zero means none)
    pub get_timeout: Option<Duration>,
    /// Timeout of `go build` (zero means none)
    pub build_timeout: Option<Duration>,
    /// Build with `-race` (forces cgo on for the compile step)
    pub race_detector: bool,
    /// Use a throwaway `GOCACHE`/`GOMODCACHE` pair for this build
    pub ephemeral_cache: bool,
}

/// Per-build `GOCACHE`/`GOMODCACHE` pair
#[derive(Debug)]
struct EphemeralCache {
    dir: TempDir,
}

impl EphemeralCache {
    fn create() -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(EPHEMERAL_CACHE_PREFIX)
            .tempdir()?;
        Ok(Self { dir })
    }

    fn build_cache(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    fn mod_cache(&self) -> PathBuf {
        self.dir.path().join("modcache")
    }
}

/// Environment in which the `go` command runs for one build
#[derive(Debug)]
pub struct GoEnv {
    go: PathBuf,
    work_dir: PathBuf,
    env: BTreeMap<String, String>,
    get_timeout: Option<Duration>,
    build_timeout: Option<Duration>,
    race_detector: bool,
    supervisor: Supervisor,
    cache: Option<EphemeralCache>,
}

impl GoEnv {
    /// Create the environment for a build module in `work_dir`
    ///
    /// `go` is the path of the go binary. Allocates the ephemeral cache if
    /// requested.
    pub fn new(
        go: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        opts: &GoOpts,
        platform: &Platform,
        supervisor: Supervisor,
    ) -> io::Result<Self> {
        let cache = if opts.ephemeral_cache {
            Some(EphemeralCache::create()?)
        } else {
            None
        };

        let inherited = if opts.copy_env {
            ambient_env()
        } else {
            BTreeMap::new()
        };

        let cache_paths = cache.as_ref().map(|c| (c.build_cache(), c.mod_cache()));
        let env = compose_env(
            inherited,
            opts,
            platform,
            cache_paths.as_ref().map(|(b, m)| (b.as_path(), m.as_path())),
        );

        Ok(Self {
            go: go.into(),
            work_dir: work_dir.into(),
            env,
            get_timeout: command_timeout(opts.get_timeout),
            build_timeout: command_timeout(opts.build_timeout),
            race_detector: opts.race_detector,
            supervisor,
            cache,
        })
    }

    /// Environment passed to every go command
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Directory of the ephemeral cache, if one was allocated
    pub fn ephemeral_cache_dir(&self) -> Option<&Path> {
        self.cache.as_ref().map(|c| c.dir.path())
    }

    /// Initialize the build module (`go mod init k6`)
    pub async fn init(&self, cancel: &CancellationToken) -> Result<(), BuildError> {
        let invocation = self.go_command(["mod", "init", BUILD_MODULE_NAME]);
        self.run(cancel, Step::ModuleInit, invocation, Some(INIT_TIMEOUT))
            .await
    }

    /// Require `path` at `version` (`latest` when unset)
    pub async fn add_requirement(
        &self,
        cancel: &CancellationToken,
        path: &str,
        version: Option<&str>,
    ) -> Result<(), BuildError> {
        let version = non_empty(version).unwrap_or(LATEST_VERSION);
        let requirement = format!("{path}@{version}");
        let invocation = self.go_command(["mod", "edit", "-require", requirement.as_str()]);
        self.run(cancel, Step::AddRequirement, invocation, self.get_timeout)
            .await
    }

    /// Replace `path[@version]` with `replace_path[@replace_version]`
    ///
    /// Environment references in `replace_path` are expanded, and local paths
    /// are made absolute against the current working directory: the manifest
    /// would otherwise resolve them against the workspace.
    pub async fn add_replacement(
        &self,
        cancel: &CancellationToken,
        path: &str,
        version: Option<&str>,
        replace_path: &str,
        replace_version: Option<&str>,
    ) -> Result<(), BuildError> {
        let replacement = resolve_replace_path(replace_path)?;
        let mapping = replace_arg(path, version, &replacement, replace_version);
        let invocation = self.go_command(["mod", "edit", "-replace", mapping.as_str()]);
        self.run(cancel, Step::AddReplacement, invocation, self.get_timeout)
            .await
    }

    /// Resolve floating versions and prune the manifest (`go mod tidy`)
    pub async fn tidy(&self, cancel: &CancellationToken) -> Result<(), BuildError> {
        let compat = format!("-compat={TIDY_COMPAT}");
        let invocation = self.go_command(["mod", "tidy", compat.as_str()]);
        self.run(cancel, Step::Tidy, invocation, self.get_timeout)
            .await
    }

    /// Compile the build module into `output`
    pub async fn compile(
        &self,
        cancel: &CancellationToken,
        output: &Path,
        build_flags: &[String],
    ) -> Result<(), BuildError> {
        let mut invocation = self
            .go_command(["build", "-o"])
            .arg(output.to_string_lossy())
            .arg("-trimpath");

        if self.race_detector {
            // the race detector requires cgo
            invocation = invocation.arg("-race").env("CGO_ENABLED", "1");
        }

        let invocation = invocation.args(build_flags.iter().cloned());
        self.run(cancel, Step::Compile, invocation, self.build_timeout)
            .await
    }

    /// Release the ephemeral cache, if any
    ///
    /// Runs `go clean -cache -modcache` against it first, since the module
    /// cache is write-protected, then removes the directory. Failures are
    /// logged, not returned.
    pub async fn close(self) {
        let Some(cache) = self.cache else {
            return;
        };

        let invocation = Invocation::new(&self.go)
            .args(["clean", "-cache", "-modcache"])
            .envs(&self.env)
            .current_dir(&self.work_dir);

        // the build token may already be cancelled
        let cancel = CancellationToken::new();
        if let Err(e) = self
            .supervisor
            .run(&cancel, &invocation, Some(CACHE_CLEAN_TIMEOUT))
            .await
        {
            warn!(error = %e, "Failed to clean ephemeral cache");
        }

        let path = cache.dir.path().to_path_buf();
        if let Err(e) = cache.dir.close() {
            warn!(path = %path.display(), error = %e, "Failed to remove ephemeral cache");
        } else {
            debug!(path = %path.display(), "Removed ephemeral cache");
        }
    }

    fn go_command<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new(&self.go)
            .args(args)
            .envs(&self.env)
            .current_dir(&self.work_dir)
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        step: Step,
        invocation: Invocation,
        timeout: Option<Duration>,
    ) -> Result<(), BuildError> {
        self.supervisor
            .run(cancel, &invocation, timeout)
            .await
            .map_err(|e| BuildError::from_step(step, e))
    }
}

/// Environment of the current process, skipping non UTF-8 entries
fn ambient_env() -> BTreeMap<String, String> {
    env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Compose the environment of go commands
///
/// Precedence from lowest to highest: `inherited` (only with `copy_env`),
/// explicit options, ephemeral cache paths.
pub fn compose_env<I>(
    inherited: I,
    opts: &GoOpts,
    platform: &Platform,
    ephemeral_cache: Option<(&Path, &Path)>,
) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: BTreeMap<String, String> = if opts.copy_env {
        inherited.into_iter().collect()
    } else {
        BTreeMap::new()
    };

    env.insert("GOOS".to_string(), platform.os.clone());
    env.insert("GOARCH".to_string(), platform.arch.clone());
    env.insert(
        "CGO_ENABLED".to_string(),
        if opts.cgo { "1" } else { "0" }.to_string(),
    );

    let overrides = [
        ("GOCACHE", &opts.go_cache),
        ("GOMODCACHE", &opts.go_mod_cache),
        ("GOPROXY", &opts.go_proxy),
        ("GONOPROXY", &opts.go_no_proxy),
        ("GOPRIVATE", &opts.go_private),
    ];
    for (key, value) in overrides {
        if let Some(value) = non_empty(value.as_deref()) {
            env.insert(key.to_string(), value.to_string());
        }
    }

    if let Some((build_cache, mod_cache)) = ephemeral_cache {
        env.insert("GOCACHE".to_string(), build_cache.display().to_string());
        env.insert("GOMODCACHE".to_string(), mod_cache.display().to_string());
    }

    env
}

/// Argument of `go mod edit -replace`
fn replace_arg(
    path: &str,
    version: Option<&str>,
    replace_path: &str,
    replace_version: Option<&str>,
) -> String {
    let mut arg = path.to_string();
    if let Some(version) = non_empty(version) {
        arg.push('@');
        arg.push_str(version);
    }
    arg.push('=');
    arg.push_str(replace_path);
    if let Some(version) = non_empty(replace_version) {
        arg.push('@');
        arg.push_str(version);
    }
    arg
}

fn resolve_replace_path(replace_path: &str) -> Result<String, BuildError> {
    let expanded = expand_env(replace_path, |name| env::var(name).ok());
    if !expanded.starts_with('.') {
        return Ok(expanded);
    }

    let cwd = env::current_dir().map_err(|source| BuildError::Workspace {
        path: PathBuf::from(&expanded),
        source,
    })?;
    Ok(absolutize(&cwd, Path::new(&expanded))
        .to_string_lossy()
        .into_owned())
}

fn env_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
            .expect("valid regex")
    })
}

/// Expand `$VAR` and `${VAR}` references; unknown variables expand to nothing
pub fn expand_env(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    env_ref_regex()
        .replace_all(value, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or("", |m| m.as_str());
            lookup(name).unwrap_or_default()
        })
        .into_owned()
}

/// Join `path` onto `base` and remove `.` and `..` components lexically
pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in base.join(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}

/// A zero timeout means no timeout
fn command_timeout(timeout: Option<Duration>) -> Option<Duration> {
    timeout.filter(|t| !t.is_zero())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
