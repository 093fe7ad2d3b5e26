//! Go module path validation
//!
//! Implements the module path rules of the Go toolchain: the first path
//! element is a lowercase domain-like name containing a dot, every element is
//! non-empty and made of `[A-Za-z0-9-._~]`, elements neither start nor end
//! with a dot, reserved Windows names and `~digits` suffixes are rejected, and
//! a trailing major version suffix (`/vN`, or `.vN` for `gopkg.in`) must be
//! well formed.

use thiserror::Error;

/// Reasons a module path is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("empty string")]
    Empty,
    #[error("leading slash")]
    LeadingSlash,
    #[error("leading dash")]
    LeadingDash,
    #[error("double slash")]
    DoubleSlash,
    #[error("trailing slash")]
    TrailingSlash,
    #[error("empty path element")]
    EmptyElement,
    #[error("invalid path element {0:?}")]
    DotsOnly(String),
    #[error("leading dot in path element")]
    LeadingDot,
    #[error("trailing dot in path element")]
    TrailingDot,
    #[error("invalid char {0:?}")]
    InvalidChar(char),
    #[error("{0:?} disallowed as path element component on Windows")]
    WindowsReserved(String),
    #[error("trailing tilde and digits in path element")]
    TildeDigits,
    #[error("missing dot in first path element")]
    MissingDot,
    #[error("invalid char {0:?} in first path element")]
    InvalidDomainChar(char),
    #[error("invalid version")]
    InvalidMajorSuffix,
}

const WINDOWS_RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Check that `path` is a valid Go module path
pub fn check_module_path(path: &str) -> Result<(), PathError> {
    check_elements(path)?;

    let first = path.split('/').next().unwrap_or_default();
    if first.is_empty() {
        return Err(PathError::LeadingSlash);
    }
    if !first.contains('.') {
        return Err(PathError::MissingDot);
    }
    if let Some(c) = first.chars().find(|c| !is_domain_char(*c)) {
        return Err(PathError::InvalidDomainChar(c));
    }

    if split_path_version(path).is_none() {
        return Err(PathError::InvalidMajorSuffix);
    }

    Ok(())
}

fn check_elements(path: &str) -> Result<(), PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    if path.starts_with('-') {
        return Err(PathError::LeadingDash);
    }
    if path.contains("//") {
        return Err(PathError::DoubleSlash);
    }
    if path.ends_with('/') {
        return Err(PathError::TrailingSlash);
    }
    if path.starts_with('/') {
        return Err(PathError::LeadingSlash);
    }

    path.split('/').try_for_each(check_element)
}

fn check_element(elem: &str) -> Result<(), PathError> {
    if elem.is_empty() {
        return Err(PathError::EmptyElement);
    }
    if elem.chars().all(|c| c == '.') {
        return Err(PathError::DotsOnly(elem.to_string()));
    }
    if elem.starts_with('.') {
        return Err(PathError::LeadingDot);
    }
    if elem.ends_with('.') {
        return Err(PathError::TrailingDot);
    }
    if let Some(c) = elem.chars().find(|c| !is_module_path_char(*c)) {
        return Err(PathError::InvalidChar(c));
    }

    let short = elem.split('.').next().unwrap_or(elem);
    if WINDOWS_RESERVED
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(short))
    {
        return Err(PathError::WindowsReserved(short.to_string()));
    }

    if let Some(i) = short.rfind('~') {
        let suffix = &short[i + 1..];
        if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PathError::TildeDigits);
        }
    }

    Ok(())
}

fn is_module_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

fn is_domain_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.')
}

/// Split a module path into prefix and major version suffix
///
/// Returns `None` when the path ends in a malformed major suffix such as
/// `/v1`, `/v0`, `/v01` or `/v2.0`. Paths without a suffix return an empty
/// suffix.
pub fn split_path_version(path: &str) -> Option<(&str, &str)> {
    if path.starts_with("gopkg.in/") {
        return split_gopkg_in(path);
    }

    let bytes = path.as_bytes();
    let mut i = bytes.len();
    let mut dot = false;
    while i > 0 && (bytes[i - 1].is_ascii_digit() || bytes[i - 1] == b'.') {
        if bytes[i - 1] == b'.' {
            dot = true;
        }
        i -= 1;
    }
    if i <= 1 || i == bytes.len() || bytes[i - 1] != b'v' || bytes[i - 2] != b'/' {
        return Some((path, ""));
    }

    let (prefix, major) = path.split_at(i - 2);
    if dot || major.len() <= 2 || major.as_bytes()[2] == b'0' || major == "/v1" {
        return None;
    }
    Some((prefix, major))
}

fn split_gopkg_in(path: &str) -> Option<(&str, &str)> {
    let base = path.strip_suffix("-unstable").unwrap_or(path);
    let bytes = base.as_bytes();
    let mut i = bytes.len();
    while i > 0 && bytes[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i <= 1 || i == bytes.len() || bytes[i - 1] != b'v' || bytes[i - 2] != b'.' {
        return None;
    }
    if bytes[i] == b'0' && i + 1 < bytes.len() {
        return None;
    }
    Some(path.split_at(i - 2))
}
