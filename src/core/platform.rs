//! Target platform
//!
//! A platform is a Go `GOOS`/`GOARCH` pair written as `os/arch`.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Platform errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// Not of the form `os/arch`
    #[error("invalid platform {0:?}: expected format os/arch")]
    InvalidFormat(String),
}

/// Target platform of a build
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    /// Go operating system name (`GOOS`)
    pub os: String,
    /// Go architecture name (`GOARCH`)
    pub arch: String,
}

impl Platform {
    /// Create a platform from its parts
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Parse a platform in the `os/arch` format
    pub fn parse(value: &str) -> Result<Self, PlatformError> {
        match value.split_once('/') {
            Some((os, arch)) if !os.is_empty() && !arch.is_empty() && !arch.contains('/') => {
                Ok(Self::new(os, arch))
            }
            _ => Err(PlatformError::InvalidFormat(value.to_string())),
        }
    }

    /// Platform of the running process, using Go names
    pub fn runtime() -> Self {
        Self::new(go_os(std::env::consts::OS), go_arch(std::env::consts::ARCH))
    }
}

impl FromStr for Platform {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

fn go_os(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

fn go_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        other => other,
    }
}
