//! Build workspace
//!
//! A uniquely named temporary directory holding the generated sources, the
//! manifest and the compiled binary of one build. The directory is removed
//! when the workspace is dropped, unless it was created with `keep`.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::defaults::{BINARY_NAME, WORKSPACE_PREFIX};
use crate::core::templates;
use crate::error::BuildError;
use crate::infra::filesystem;

/// Temporary directory of one build
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
    keep: bool,
}

impl Workspace {
    /// Create a workspace under `root` (the system temp dir when `None`)
    pub fn create(root: Option<&Path>, keep: bool) -> Result<Self, BuildError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX).keep(keep);

        let dir = match root {
            Some(root) => {
                filesystem::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|source| BuildError::Workspace {
            path: root.map_or_else(std::env::temp_dir, Path::to_path_buf),
            source,
        })?;

        let path = dir.path().to_path_buf();
        debug!(path = %path.display(), "Created workspace");

        Ok(Self {
            dir: Some(dir),
            path,
            keep,
        })
    }

    /// Workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the compiled binary is written
    pub fn binary_path(&self) -> PathBuf {
        self.path.join(BINARY_NAME)
    }

    /// Write `main.go` running the command of `base_import_path`
    pub fn write_main(&self, base_import_path: &str) -> Result<PathBuf, BuildError> {
        let path = self.path.join("main.go");
        filesystem::write_file(&path, &templates::main_source(base_import_path))?;
        Ok(path)
    }

    /// Write the blank import file of `import_path`
    pub fn write_import(&self, import_path: &str) -> Result<PathBuf, BuildError> {
        let path = self.path.join(templates::import_file_name(import_path));
        filesystem::write_file(&path, &templates::import_source(import_path))?;
        Ok(path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        if self.keep {
            info!(path = %self.path.display(), "Skipping cleanup; leaving workspace intact");
            return;
        }

        debug!(path = %self.path.display(), "Cleaning up workspace");
        if let Err(e) = dir.close() {
            warn!(path = %self.path.display(), error = %e, "Failed to remove workspace");
        }
    }
}
