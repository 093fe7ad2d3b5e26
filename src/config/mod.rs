//! Configuration and constants
//!
//! - [`defaults`] - built-in default values
//! - [`settings`] - user configuration file (`config.toml`)

pub mod defaults;
pub mod settings;
