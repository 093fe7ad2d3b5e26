//! CLI command for `k6foundry doctor`
//!
//! Checks that the Go toolchain and git are available and that the
//! configuration file is valid.

use anyhow::Result;
use std::path::Path;

use crate::cli::output::{print_detail, print_info, print_success, print_warning, status};
use crate::core::toolchain::run_doctor;

/// Execute the doctor command
pub async fn execute(config_path: &Path, json: bool) -> Result<()> {
    let report = run_doctor(config_path).await;

    if json {
        let json_result = serde_json::json!({
            "status": if report.all_passed() { "success" } else { "error" },
            "checks": report.checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "passed": c.passed,
                "version": c.version,
                "path": c.path,
                "error": c.error,
                "suggestion": c.suggestion
            })).collect::<Vec<_>>(),
            "config_issues": report.config_issues,
            "passed_count": report.passed_count(),
            "total_count": report.checks.len()
        });
        println!("{}", serde_json::to_string_pretty(&json_result)?);

        if !report.all_passed() {
            return Err(anyhow::anyhow!("Prerequisites missing or configuration invalid"));
        }
        return Ok(());
    }

    print_info("Checking build prerequisites...");

    for check in &report.checks {
        if check.passed {
            let version = check
                .version
                .as_ref()
                .map(|v| format!(" ({v})"))
                .unwrap_or_default();
            eprintln!("  {} {}{version}", status::SUCCESS, check.name);
            if let Some(path) = &check.path {
                print_detail(&path.display().to_string());
            }
        } else {
            eprintln!("  {} {}", status::ERROR, check.name);
            if let Some(error) = &check.error {
                print_detail(&format!("Error: {error}"));
            }
            if let Some(suggestion) = &check.suggestion {
                print_detail(&format!("Suggestion: {suggestion}"));
            }
        }
    }

    if !report.config_issues.is_empty() {
        print_warning(&format!("Configuration issues ({}):", config_path.display()));
        for issue in &report.config_issues {
            print_detail(&format!("• {issue}"));
        }
    }

    let passed = report.passed_count();
    let total = report.checks.len();
    if report.all_passed() {
        print_success(&format!("All checks passed ({passed}/{total})"));
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "{passed}/{total} checks passed. Install the missing prerequisites and retry."
        ))
    }
}
