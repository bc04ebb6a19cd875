//! Error types for Statecraft.
//!
//! This module defines the error types used throughout Statecraft, covering
//! playbook decoding, template rendering, task validation and execution,
//! inventory loading, and role resolution.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Statecraft operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Statecraft.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Decoding Errors
    // ========================================================================
    /// A task names a module that is not registered.
    #[error("Unknown module '{0}'")]
    UnknownModule(String),

    /// A task mapping could not be decoded into the task envelope.
    #[error("Failed to decode task: {0}")]
    TaskDecode(String),

    /// Error parsing a playbook file.
    #[error("Failed to parse playbook '{path}': {message}")]
    PlaybookParse {
        /// Path to the playbook file
        path: PathBuf,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Task Errors
    // ========================================================================
    /// A module rejected its parameters before any side effect occurred.
    #[error("Invalid arguments for module '{module}': {message}")]
    InvalidParameter {
        /// Module name
        module: &'static str,
        /// Error message
        message: String,
    },

    /// A required module parameter is missing.
    #[error("Module '{module}' is missing required parameter '{parameter}'")]
    MissingParameter {
        /// Module name
        module: &'static str,
        /// Parameter name
        parameter: &'static str,
    },

    /// A task's apply step reported failure.
    #[error("Task '{task}' failed: {message}")]
    TaskFailed {
        /// Task name or module label
        task: String,
        /// Error message
        message: String,
    },

    /// A rendered `loop` value was not list-shaped.
    #[error("Loop value must be a list, got {0}")]
    LoopShape(String),

    // ========================================================================
    // Inventory / Role Errors
    // ========================================================================
    /// Error loading inventory.
    #[error("Failed to load inventory from '{path}': {message}")]
    InventoryLoad {
        /// Path to inventory
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// A play references a role that does not exist under the roles path.
    #[error("Role '{0}' not found")]
    RoleNotFound(String),

    /// Error loading a role component (defaults, vars, tasks).
    #[error("Failed to load role file '{path}': {message}")]
    RoleLoad {
        /// Path to the offending file
        path: PathBuf,
        /// Error message
        message: String,
    },

    // ========================================================================
    // Wrapped Errors
    // ========================================================================
    /// Template rendering or expression evaluation failed.
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// YAML decoding failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Underlying I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failure (get_url module).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Helper to build a validation error for a module parameter.
    pub fn invalid_parameter(module: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            module,
            message: message.into(),
        }
    }

    /// Helper to build a task failure with context.
    pub fn task_failed(task: impl Into<String>, message: impl Into<String>) -> Self {
        Error::TaskFailed {
            task: task.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error came from parameter validation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidParameter { .. } | Error::MissingParameter { .. }
        )
    }
}
