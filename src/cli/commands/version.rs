//! CLI command for `k6foundry version`

use anyhow::Result;

use crate::core::toolchain;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build metadata lines, omitting values that were not recorded
pub fn build_info() -> Vec<(&'static str, &'static str)> {
    [
        ("commit", option_env!("VERGEN_GIT_SHA")),
        ("commit date", option_env!("VERGEN_GIT_COMMIT_TIMESTAMP")),
        ("built", option_env!("VERGEN_BUILD_TIMESTAMP")),
        ("target", option_env!("VERGEN_CARGO_TARGET_TRIPLE")),
        ("rustc", option_env!("VERGEN_RUSTC_SEMVER")),
    ]
    .into_iter()
    .filter_map(|(name, value)| {
        value
            .filter(|v| !v.is_empty() && *v != "VERGEN_IDEMPOTENT_OUTPUT")
            .map(|v| (name, v))
    })
    .collect()
}

/// Execute the version command
pub async fn execute() -> Result<()> {
    println!("k6foundry {VERSION}");
    for (name, value) in build_info() {
        println!("  {name}: {value}");
    }

    match toolchain::probe_go().await {
        Ok(go) => println!("  go: {}", go.version),
        Err(_) => println!("  go: not found"),
    }

    Ok(())
}
