//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    /// Generate a valid Go module path (`domain.tld/elem[/elem...]`)
    ///
    /// Elements are prefixed with `x` so they never collide with reserved
    /// Windows names or major version suffixes.
    pub fn module_path() -> impl Strategy<Value = String> {
        (
            "x[a-z0-9]{1,8}\\.(io|com|dev)",
            prop::collection::vec("x[a-z0-9-]{0,8}[a-z]", 1..3),
        )
            .prop_map(|(domain, elems)| format!("{domain}/{}", elems.join("/")))
    }

    /// Generate a canonical Go semantic version (`vX.Y.Z`)
    pub fn semver_version() -> impl Strategy<Value = String> {
        (0u64..30, 0u64..100, 0u64..100)
            .prop_map(|(major, minor, patch)| format!("v{major}.{minor}.{patch}"))
    }

    /// Generate an environment variable assignment
    pub fn env_var() -> impl Strategy<Value = (String, String)> {
        ("[A-Z][A-Z_]{0,8}", "[a-zA-Z0-9/_.-]{1,20}")
    }

    /// Generate a Go target platform
    pub fn platform() -> impl Strategy<Value = (String, String)> {
        (
            prop_oneof![Just("linux"), Just("darwin"), Just("windows")],
            prop_oneof![Just("amd64"), Just("arm64"), Just("386")],
        )
            .prop_map(|(os, arch)| (os.to_string(), arch.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_module_path_generator(path in module_path()) {
            prop_assert!(path.contains('/'));
            prop_assert!(crate::core::module_path::check_module_path(&path).is_ok());
        }

        #[test]
        fn test_semver_version_generator(version in semver_version()) {
            prop_assert!(crate::core::module::parse_semver(&version).is_some());
        }
    }
}
