//! Toolchain prerequisites
//!
//! Locates the `go` and `git` binaries and checks that they answer a `version`
//! probe. Builds cannot start without both; `k6foundry doctor` reports on them.

use std::path::{Path, PathBuf};

use crate::config::defaults::PROBE_TIMEOUT;
use crate::config::settings::Settings;
use crate::core::platform::Platform;
use crate::error::BuildError;
use crate::infra::process::probe_output;

/// A working Go toolchain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoToolchain {
    /// Absolute path of the `go` binary
    pub path: PathBuf,
    /// Toolchain version without the `go` prefix (e.g. `1.22.1`)
    pub version: String,
    /// Host platform reported by the toolchain
    pub platform: Option<Platform>,
}

/// A working git installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Git {
    /// Absolute path of the `git` binary
    pub path: PathBuf,
    /// Reported version, if recognizable
    pub version: Option<String>,
}

/// Locate and probe the Go toolchain
pub async fn probe_go() -> Result<GoToolchain, BuildError> {
    let not_found = |reason: String| BuildError::GoToolchainNotFound { reason };

    let path = which::which("go").map_err(|e| not_found(e.to_string()))?;
    let stdout = version_output(&path)
        .await
        .map_err(not_found)?;
    let (version, platform) = parse_go_version(&stdout)
        .ok_or_else(|| not_found(format!("unexpected `go version` output: {}", stdout.trim())))?;

    tracing::debug!(path = %path.display(), version = %version, "Found Go toolchain");
    Ok(GoToolchain {
        path,
        version,
        platform,
    })
}

/// Locate and probe git
pub async fn probe_git() -> Result<Git, BuildError> {
    let not_found = |reason: String| BuildError::GitNotFound { reason };

    let path = which::which("git").map_err(|e| not_found(e.to_string()))?;
    let stdout = version_output(&path).await.map_err(not_found)?;

    tracing::debug!(path = %path.display(), "Found git");
    Ok(Git {
        path,
        version: extract_version(&stdout),
    })
}

async fn version_output(program: &Path) -> Result<String, String> {
    probe_output(program, &["version"], PROBE_TIMEOUT)
        .await
        .map_err(|e| e.to_string())
}

/// Parse `go version goX.Y.Z os/arch`
pub fn parse_go_version(output: &str) -> Option<(String, Option<Platform>)> {
    let fields: Vec<&str> = output.split_whitespace().collect();
    if fields.len() < 4 || fields[0] != "go" || fields[1] != "version" {
        return None;
    }

    let version = fields[2].strip_prefix("go")?;
    if version.is_empty() {
        return None;
    }

    let platform = fields.last().and_then(|p| Platform::parse(p).ok());
    Some((version.to_string(), platform))
}

/// Extract a version string like `2.39.0` from command output
fn extract_version(output: &str) -> Option<String> {
    let version_regex = regex::Regex::new(r"v?(\d+\.\d+(?:\.\d+)?(?:-\w+)?)").ok()?;
    version_regex
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Result of a single prerequisite check
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the dependency being checked
    pub name: String,
    /// Whether the check passed
    pub passed: bool,
    /// Version if available
    pub version: Option<String>,
    /// Where the binary was found
    pub path: Option<PathBuf>,
    /// Error message if check failed
    pub error: Option<String>,
    /// Suggestion for fixing the issue
    pub suggestion: Option<String>,
}

impl CheckResult {
    /// Create a passing check result
    pub fn pass(name: &str, version: Option<String>, path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            version,
            path: Some(path),
            error: None,
            suggestion: None,
        }
    }

    /// Create a failing check result
    pub fn fail(name: &str, error: &str, suggestion: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            version: None,
            path: None,
            error: Some(error.to_string()),
            suggestion: Some(suggestion.to_string()),
        }
    }
}

/// Prerequisites report
#[derive(Debug, Default)]
pub struct DoctorReport {
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Configuration issues found
    pub config_issues: Vec<String>,
}

impl DoctorReport {
    /// Add a check result
    pub fn add_check(&mut self, result: CheckResult) {
        self.checks.push(result);
    }

    /// Whether every check passed and the configuration is valid
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed) && self.config_issues.is_empty()
    }

    /// Count passed checks
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    /// Failed checks
    pub fn failed(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }
}

/// Check the Go toolchain
pub async fn check_go() -> CheckResult {
    match probe_go().await {
        Ok(go) => CheckResult::pass("Go toolchain", Some(go.version), go.path),
        Err(e) => CheckResult::fail(
            "Go toolchain",
            &e.to_string(),
            "Install Go from https://go.dev/dl/ and make sure `go` is in PATH",
        ),
    }
}

/// Check git
pub async fn check_git() -> CheckResult {
    match probe_git().await {
        Ok(git) => CheckResult::pass("Git", git.version, git.path),
        Err(e) => CheckResult::fail(
            "Git",
            &e.to_string(),
            "Install Git from https://git-scm.com/ or use your package manager",
        ),
    }
}

/// Run all prerequisite checks and validate the config file
pub async fn run_doctor(config_path: &Path) -> DoctorReport {
    let mut report = DoctorReport::default();
    report.add_check(check_go().await);
    report.add_check(check_git().await);

    if let Err(e) = Settings::load_from_path(config_path) {
        report.config_issues.push(e.to_string());
    }

    report
}
