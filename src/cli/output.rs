//! Output formatting and progress indicators
//!
//! Status messages go to stderr so that stdout stays clean for JSON output.

use indicatif::{ProgressBar, ProgressStyle};

/// Create a spinner for operations with unknown duration
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.blue} {msg} [{elapsed}]")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}

/// Print a success message
pub fn print_success(message: &str) {
    eprintln!("{} {message}", status::SUCCESS);
}

/// Print an informational message
pub fn print_info(message: &str) {
    eprintln!("{} {message}", status::INFO);
}

/// Print a warning
pub fn print_warning(message: &str) {
    eprintln!("{} {message}", status::WARNING);
}

/// Print an indented detail line
pub fn print_detail(message: &str) {
    eprintln!("    {message}");
}

/// Print an error and the causes not already part of its message
pub fn display_error(error: &anyhow::Error) {
    let message = error.to_string();
    eprintln!("{} {message}", status::ERROR);

    let mut shown = message;
    for cause in error.chain().skip(1) {
        let cause = cause.to_string();
        if shown.contains(&cause) {
            continue;
        }
        print_detail(&format!("caused by: {cause}"));
        shown.push_str(&cause);
    }
}
