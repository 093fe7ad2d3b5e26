//! Common test utilities and helpers
//!
//! Integration tests build against a file-based module proxy populated from
//! the modules under `tests/fixtures/mods`, so they never touch the network.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// Fixed timestamp reported for every fixture version
const VERSION_TIME: &str = "2024-01-01T00:00:00Z";

/// Whether the tools a real build needs are installed
///
/// Tests that shell out to the Go toolchain return early when it is missing,
/// after printing a notice naming the skipped test. Setting
/// `K6FOUNDRY_REQUIRE_GO` turns a missing toolchain into a failure.
pub fn toolchain_available(test: &str) -> bool {
    if which::which("go").is_ok() && which::which("git").is_ok() {
        return true;
    }
    assert!(
        std::env::var_os("K6FOUNDRY_REQUIRE_GO").is_none(),
        "{test}: go and git are required"
    );
    eprintln!("skipping {test}: go or git not found in PATH");
    false
}

/// Directory holding the fixture module sources
pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("mods")
}

/// A module version published by the [`GoProxy`]
pub struct FixtureModule {
    /// Module path
    pub path: &'static str,
    /// Canonical version
    pub version: &'static str,
    /// Directory under [`fixtures_dir`]
    pub source: &'static str,
}

/// The modules every build test can resolve
pub const FIXTURE_MODULES: &[FixtureModule] = &[
    FixtureModule {
        path: "go.k6.io/k6",
        version: "v0.1.0",
        source: "k6",
    },
    FixtureModule {
        path: "go.k6.io/k6",
        version: "v0.2.0",
        source: "k6",
    },
    FixtureModule {
        path: "go.k6.io/k6ext",
        version: "v0.1.0",
        source: "k6ext",
    },
    FixtureModule {
        path: "go.k6.io/k6ext/v2",
        version: "v2.0.0",
        source: "k6extV2",
    },
];

/// Module proxy served from a directory through a `file://` URL
///
/// Lays out each module following the GOPROXY protocol:
/// `<path>/@v/list`, `<path>/@v/<version>.{info,mod,zip}` and `<path>/@latest`.
pub struct GoProxy {
    dir: TempDir,
}

impl GoProxy {
    /// Create a proxy publishing `modules`
    pub fn new(modules: &[FixtureModule]) -> Self {
        let dir = TempDir::new().expect("Failed to create proxy directory");
        let proxy = Self { dir };
        for module in modules {
            proxy.publish(module);
        }
        proxy
    }

    /// Create a proxy publishing [`FIXTURE_MODULES`]
    pub fn with_fixtures() -> Self {
        Self::new(FIXTURE_MODULES)
    }

    /// Value for `GOPROXY`
    pub fn url(&self) -> String {
        format!("file://{}", self.dir.path().display())
    }

    fn publish(&self, module: &FixtureModule) {
        let src = fixtures_dir().join(module.source);
        let module_dir = self.dir.path().join(module.path);
        let versions_dir = module_dir.join("@v");
        fs::create_dir_all(&versions_dir).expect("Failed to create module directory");

        let info = format!(
            r#"{{"Version":"{}","Time":"{VERSION_TIME}"}}"#,
            module.version
        );
        fs::write(versions_dir.join(format!("{}.info", module.version)), &info)
            .expect("Failed to write version info");
        fs::copy(
            src.join("go.mod"),
            versions_dir.join(format!("{}.mod", module.version)),
        )
        .expect("Failed to copy go.mod");
        write_module_zip(
            &versions_dir.join(format!("{}.zip", module.version)),
            &format!("{}@{}", module.path, module.version),
            &src,
        );

        let mut versions: Vec<semver::Version> = fs::read_dir(&versions_dir)
            .expect("Failed to list versions")
            .filter_map(|entry| {
                let name = entry.ok()?.file_name().into_string().ok()?;
                let version = name.strip_suffix(".info")?.strip_prefix('v')?;
                semver::Version::parse(version).ok()
            })
            .collect();
        versions.sort();

        let list: Vec<String> = versions.iter().map(|v| format!("v{v}")).collect();
        fs::write(versions_dir.join("list"), list.join("\n") + "\n")
            .expect("Failed to write version list");

        if let Some(latest) = versions.last() {
            let latest_info = format!(r#"{{"Version":"v{latest}","Time":"{VERSION_TIME}"}}"#);
            fs::write(module_dir.join("@latest"), latest_info)
                .expect("Failed to write latest version");
        }
    }
}

/// Zip `src` with every entry under `prefix/`, as the module zip format requires
fn write_module_zip(dest: &Path, prefix: &str, src: &Path) {
    let file = fs::File::create(dest).expect("Failed to create module zip");
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    for entry in walkdir::WalkDir::new(src).sort_by_file_name() {
        let entry = entry.expect("Failed to walk module source");
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(src)
            .expect("Entry outside of module source");
        let name = format!(
            "{prefix}/{}",
            relative.to_string_lossy().replace('\\', "/")
        );
        zip.start_file(name, options)
            .expect("Failed to add zip entry");
        zip.write_all(&fs::read(entry.path()).expect("Failed to read module file"))
            .expect("Failed to write zip entry");
    }

    zip.finish().expect("Failed to finish module zip");
}

/// Module cache private to a test
///
/// Extracted modules are read-only, so the cache is emptied with
/// `go clean -modcache` before the directory is removed.
pub struct ModCache {
    dir: TempDir,
}

impl ModCache {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create module cache"),
        }
    }

    /// Value for `GOMODCACHE`
    pub fn path(&self) -> String {
        self.dir.path().display().to_string()
    }
}

impl Default for ModCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ModCache {
    fn drop(&mut self) {
        let _ = Command::new("go")
            .args(["clean", "-modcache"])
            .env("GOMODCACHE", self.dir.path())
            .status();
    }
}
