//! Default configuration values

use std::time::Duration;

/// Module path of the base program
pub const DEFAULT_BASE_MODULE: &str = "go.k6.io/k6";

/// Module name given to the generated build module (`go mod init`)
pub const BUILD_MODULE_NAME: &str = "k6";

/// Default base program version
pub const DEFAULT_BASE_VERSION: &str = "latest";

/// Floating version marker resolved by `go mod tidy`
pub const LATEST_VERSION: &str = "latest";

/// Name of the compiled binary inside the workspace
pub const BINARY_NAME: &str = "k6";

/// Default output path for the CLI
pub const DEFAULT_OUTPUT: &str = "k6";

/// Prefix of the temporary build workspace directory
pub const WORKSPACE_PREFIX: &str = "k6foundry";

/// Prefix of the ephemeral GOCACHE/GOMODCACHE directory
pub const EPHEMERAL_CACHE_PREFIX: &str = "k6foundry-cache";

/// Go compatibility level passed to `go mod tidy`
pub const TIDY_COMPAT: &str = "1.17";

/// Timeout for `go mod init`, which never touches the network
pub const INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Time a cancelled command gets to exit on its own before it is killed
pub const KILL_GRACE_PERIOD: Duration = Duration::from_secs(15);

/// Timeout for `go version` and `git version` probes
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for cleaning the ephemeral cache on close
pub const CACHE_CLEAN_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum number of stderr bytes kept for error reports
pub const MAX_CAPTURED_STDERR: usize = 16 * 1024;
