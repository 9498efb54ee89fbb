//! Error types for local sandbox provisioning.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for sandbox operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Every port in the configured range is taken.
    #[error("no available port in range {start}..={end}")]
    NoPortAvailable { start: u16, end: u16 },

    /// A path resolved to a location outside the workspace root.
    #[error("path escapes workspace root: {path}")]
    PathEscape { path: String },

    /// The requested file does not exist.
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// No sandbox has been created under this identifier.
    #[error("sandbox not initialized: {0}")]
    WorkspaceNotInitialized(String),

    /// Failed to create a sandbox.
    #[error("failed to create sandbox: {0}")]
    SandboxCreation(String),

    /// Project scaffolding failed.
    #[error("scaffold failed: {0}")]
    Scaffold(String),

    /// The development server could not be started.
    #[error("dev server error: {0}")]
    DevServer(String),

    /// IO error during sandbox operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, Error>;
