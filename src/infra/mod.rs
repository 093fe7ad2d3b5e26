//! Infrastructure layer
//!
//! Handles filesystem operations and external processes.
//! This module is the only place where commands are spawned.

pub mod filesystem;
pub mod go_env;
pub mod process;
