//! Filesystem operations
//!
//! Handles file and directory operations of the build workspace and the
//! output binary.

use std::io;
use std::path::Path;

use crate::error::BuildError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), BuildError> {
    std::fs::create_dir_all(path).map_err(|source| BuildError::Workspace {
        path: path.to_path_buf(),
        source,
    })
}

/// Write content to a file
pub fn write_file(path: &Path, content: &str) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    std::fs::write(path, content).map_err(|source| BuildError::Workspace {
        path: path.to_path_buf(),
        source,
    })
}

/// Mark a file as executable by everyone (no-op on non-unix platforms)
pub fn set_executable(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
