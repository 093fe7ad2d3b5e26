//! Error types for k6foundry
//!
//! Domain-specific error types using thiserror. Layer-specific errors live next
//! to their layer ([`crate::core::module::ModuleError`],
//! [`crate::infra::process::ProcessError`], ...); [`BuildError`] is the
//! terminal error a caller receives for a failed build.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::module::ModuleError;
use crate::infra::process::ProcessError;

/// Logical build step an external command belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// `go mod init`
    ModuleInit,
    /// `go mod edit -require`
    AddRequirement,
    /// `go mod edit -replace`
    AddReplacement,
    /// `go mod tidy`
    Tidy,
    /// `go build`
    Compile,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ModuleInit => "initializing module",
            Self::AddRequirement => "adding requirement",
            Self::AddReplacement => "adding replacement",
            Self::Tidy => "tidying module",
            Self::Compile => "compiling",
        };
        f.write_str(name)
    }
}

/// Coarse classification of a [`BuildError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Go toolchain or git missing
    PrerequisiteMissing,
    /// Temporary workspace could not be created or written
    Workspace,
    /// `go mod init` failed
    ModuleInit,
    /// A dependency could not be added or resolved
    Dependency,
    /// `go build` failed
    Compile,
    /// An external command could not be started or awaited
    Process,
    /// The build was cancelled or a step timed out
    Cancelled,
    /// A module reference is inconsistent with its version
    InvalidInput,
    /// The binary could not be copied to the output
    Output,
}

/// Build errors
#[derive(Error, Debug)]
pub enum BuildError {
    /// Go toolchain not found or not working
    #[error("Go toolchain not found: {reason}")]
    GoToolchainNotFound { reason: String },

    /// Git not found or not working
    #[error("git not found: {reason}")]
    GitNotFound { reason: String },

    /// Workspace setup failed
    #[error("Failed to set up workspace '{path}': {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Module initialization failed
    #[error("Failed to initialize build module: {source}")]
    ModuleInit {
        #[source]
        source: ProcessError,
    },

    /// Dependency resolution failed
    #[error("Failed to resolve dependency{}: {step}: {source}", module_suffix(.module))]
    Dependency {
        module: Option<String>,
        step: Step,
        #[source]
        source: ProcessError,
    },

    /// Compilation failed
    #[error("Failed to compile binary: {source}")]
    Compile {
        #[source]
        source: ProcessError,
    },

    /// External command could not be executed
    #[error("Failed executing go command while {step}: {source}")]
    Process {
        step: Step,
        #[source]
        source: ProcessError,
    },

    /// Build cancelled or timed out
    #[error("Build cancelled while {step}: {source}")]
    Cancelled {
        step: Step,
        #[source]
        source: ProcessError,
    },

    /// Invalid module reference
    #[error(transparent)]
    InvalidModule(#[from] ModuleError),

    /// Copying the binary to the output failed
    #[error("Failed to copy binary to output: {source}")]
    Output {
        #[source]
        source: std::io::Error,
    },
}

fn module_suffix(module: &Option<String>) -> String {
    module
        .as_ref()
        .map(|m| format!(" '{m}'"))
        .unwrap_or_default()
}

impl BuildError {
    /// Classify the failure of an external command run for `step`
    ///
    /// Cancellation and timeouts map to [`BuildError::Cancelled`], commands that
    /// could not be started or awaited to [`BuildError::Process`], and non-zero
    /// exits to the error of the step itself.
    pub fn from_step(step: Step, source: ProcessError) -> Self {
        if source.is_cancellation() {
            return Self::Cancelled { step, source };
        }
        if !source.is_exit_failure() {
            return Self::Process { step, source };
        }
        match step {
            Step::ModuleInit => Self::ModuleInit { source },
            Step::AddRequirement | Step::AddReplacement | Step::Tidy => Self::Dependency {
                module: None,
                step,
                source,
            },
            Step::Compile => Self::Compile { source },
        }
    }

    /// Attach the dependency being processed to a dependency error
    #[must_use]
    pub fn for_module(self, path: &str) -> Self {
        match self {
            Self::Dependency {
                module: None,
                step,
                source,
            } => Self::Dependency {
                module: Some(path.to_string()),
                step,
                source,
            },
            other => other,
        }
    }

    /// Error classification
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::GoToolchainNotFound { .. } | Self::GitNotFound { .. } => {
                ErrorKind::PrerequisiteMissing
            }
            Self::Workspace { .. } => ErrorKind::Workspace,
            Self::ModuleInit { .. } => ErrorKind::ModuleInit,
            Self::Dependency { .. } => ErrorKind::Dependency,
            Self::Compile { .. } => ErrorKind::Compile,
            Self::Process { .. } => ErrorKind::Process,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::InvalidModule(_) => ErrorKind::InvalidInput,
            Self::Output { .. } => ErrorKind::Output,
        }
    }

    /// Whether the build was cancelled or timed out (and may be retried)
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}
