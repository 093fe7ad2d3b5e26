//! Module references
//!
//! Parses dependency specifications of the form
//! `path[@version][=replace[@replace_version]]` and computes version-qualified
//! import paths following Go's semantic import versioning rules.

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

use crate::config::defaults::LATEST_VERSION;
use crate::core::module_path::check_module_path;

/// Module reference errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    /// Malformed dependency specification
    #[error("invalid dependency format: {spec:?}")]
    InvalidFormat { spec: String },

    /// Version is neither `latest` nor a semantic version
    #[error("invalid dependency version: {spec:?}")]
    InvalidVersion { spec: String },

    /// Path is not a valid module path
    #[error("invalid dependency path: {spec:?}: {reason}")]
    InvalidPath { spec: String, reason: String },

    /// Path ends in a major version suffix that contradicts the version
    #[error("versioned path {path:?} conflicts with requested major version {major} ({version})")]
    MajorVersionConflict {
        path: String,
        version: String,
        major: String,
    },
}

/// Replacement source for a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replace {
    /// Module path or local filesystem path (starting with `.`)
    pub path: String,
    /// Version of a module replacement; always `None` for local paths
    pub version: Option<String>,
}

impl Replace {
    /// Whether the replacement points to a local directory
    pub fn is_local(&self) -> bool {
        is_local_path(&self.path)
    }
}

/// A Go module and its version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Import path of the module, as written by the caller
    pub path: String,
    /// `latest` or a canonical semantic version
    pub version: String,
    /// Optional replacement source
    pub replace: Option<Replace>,
}

impl Module {
    /// Module at a version, without replacement
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
            replace: None,
        }
    }

    /// Replace the module with another module or a local directory
    #[must_use]
    pub fn with_replace(mut self, path: impl Into<String>, version: Option<String>) -> Self {
        self.replace = Some(Replace {
            path: path.into(),
            version,
        });
        self
    }

    /// Parse a dependency specification
    ///
    /// Accepted forms:
    /// - `github.com/org/module` (version defaults to `latest`)
    /// - `github.com/org/module@v0.1.0`
    /// - `github.com/org/module=github.com/fork/module@v0.2.0`
    /// - `github.com/org/module=../local/module`
    pub fn parse(spec: &str) -> Result<Self, ModuleError> {
        let format_error = || ModuleError::InvalidFormat {
            spec: spec.to_string(),
        };

        let (target, replacement) = match spec.split_once('=') {
            Some((target, replacement)) => (target, Some(replacement)),
            None => (spec, None),
        };

        let (path, version) = split_version(target).ok_or_else(format_error)?;
        if path.is_empty() {
            return Err(format_error());
        }

        let version = match version {
            None => LATEST_VERSION.to_string(),
            Some(v) => normalize_version(v).ok_or_else(|| ModuleError::InvalidVersion {
                spec: spec.to_string(),
            })?,
        };

        check_module_path(path).map_err(|e| ModuleError::InvalidPath {
            spec: spec.to_string(),
            reason: e.to_string(),
        })?;
        versioned_path(path, &version).map_err(|e| ModuleError::InvalidPath {
            spec: spec.to_string(),
            reason: e.to_string(),
        })?;

        let replace = match replacement {
            None => None,
            Some(replacement) => Some(parse_replace(spec, replacement)?),
        };

        Ok(Self {
            path: path.to_string(),
            version,
            replace,
        })
    }

    /// Import path qualified with the major version of [`Self::version`]
    pub fn versioned_path(&self) -> Result<String, ModuleError> {
        versioned_path(&self.path, &self.version)
    }

    /// Version to pin in the manifest, `None` for the floating `latest`
    pub fn pinned_version(&self) -> Option<&str> {
        (self.version != LATEST_VERSION).then_some(self.version.as_str())
    }
}

impl FromStr for Module {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.version)?;
        if let Some(replace) = &self.replace {
            write!(f, "={}", replace.path)?;
            if let Some(version) = &replace.version {
                write!(f, "@{version}")?;
            }
        }
        Ok(())
    }
}

fn parse_replace(spec: &str, replacement: &str) -> Result<Replace, ModuleError> {
    let format_error = || ModuleError::InvalidFormat {
        spec: spec.to_string(),
    };

    let (path, version) = split_version(replacement).ok_or_else(format_error)?;
    if path.is_empty() {
        return Err(format_error());
    }

    if is_local_path(path) {
        if version.is_some() {
            return Err(format_error());
        }
        return Ok(Replace {
            path: path.to_string(),
            version: None,
        });
    }

    check_module_path(path).map_err(|e| ModuleError::InvalidPath {
        spec: spec.to_string(),
        reason: e.to_string(),
    })?;

    let version = version
        .map(|v| {
            normalize_version(v).ok_or_else(|| ModuleError::InvalidVersion {
                spec: spec.to_string(),
            })
        })
        .transpose()?;

    Ok(Replace {
        path: path.to_string(),
        version,
    })
}

/// Split `path[@version]`; `None` when the `@` has an empty side
fn split_version(s: &str) -> Option<(&str, Option<&str>)> {
    match s.split_once('@') {
        None => Some((s, None)),
        Some((path, version)) if !path.is_empty() && !version.is_empty() => {
            Some((path, Some(version)))
        }
        Some(_) => None,
    }
}

fn is_local_path(path: &str) -> bool {
    path.starts_with('.')
}

/// `latest` or the canonical form of a semantic version
pub fn normalize_version(version: &str) -> Option<String> {
    if version == LATEST_VERSION {
        return Some(version.to_string());
    }
    canonical_version(version)
}

/// Parse a Go semantic version (`vMAJOR[.MINOR[.PATCH[-pre][+build]]]`)
///
/// Missing minor and patch components default to zero. Prerelease and build
/// suffixes are only accepted on complete versions.
pub fn parse_semver(version: &str) -> Option<semver::Version> {
    let rest = version.strip_prefix('v')?;
    let split = rest.find(|c: char| c == '-' || c == '+').unwrap_or(rest.len());
    let (core, suffix) = rest.split_at(split);

    let padded = match core.matches('.').count() {
        0 if suffix.is_empty() => format!("{core}.0.0"),
        1 if suffix.is_empty() => format!("{core}.0"),
        2 => format!("{core}{suffix}"),
        _ => return None,
    };

    semver::Version::parse(&padded).ok()
}

/// Canonical form of a Go semantic version: `vX.Y.Z[-pre]`
///
/// Build metadata is dropped, except for `+incompatible`.
pub fn canonical_version(version: &str) -> Option<String> {
    let parsed = parse_semver(version)?;
    let mut canonical = format!("v{}.{}.{}", parsed.major, parsed.minor, parsed.patch);
    if !parsed.pre.is_empty() {
        canonical.push('-');
        canonical.push_str(parsed.pre.as_str());
    }
    if parsed.build.as_str() == "incompatible" {
        canonical.push_str("+incompatible");
    }
    Some(canonical)
}

/// Major component of a Go semantic version (`v2` for `v2.1.0`)
pub fn major_version(version: &str) -> Option<String> {
    parse_semver(version).map(|v| format!("v{}", v.major))
}

fn major_suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r".+/(v\d+)$").expect("valid regex"))
}

/// Returns `path` with the major component of `version` appended, if any
///
/// - `foo` at `v1.0.0` returns `foo`
/// - `foo` at `v2.0.0` returns `foo/v2`
/// - `foo/v2` at `v3.0.0` is an error
/// - `foo` at `latest` returns `foo`
pub fn versioned_path(path: &str, version: &str) -> Result<String, ModuleError> {
    // commit hashes and `latest` carry no major version
    let Some(major) = major_version(version) else {
        return Ok(path.to_string());
    };

    if let Some(captures) = major_suffix_regex().captures(path) {
        if captures[1] != major {
            return Err(ModuleError::MajorVersionConflict {
                path: path.to_string(),
                version: version.to_string(),
                major,
            });
        }
        return Ok(path.to_string());
    }

    match major.as_str() {
        "v0" | "v1" => Ok(path.to_string()),
        _ => Ok(format!("{path}/{major}")),
    }
}
