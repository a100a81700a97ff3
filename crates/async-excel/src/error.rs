//! Error types for async-excel.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by [`AsyncWorkbook`](crate::AsyncWorkbook) and the connection manager.
#[derive(Debug, Error)]
pub enum Error {
    /// The document does not exist on disk
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The document's extension is not a spreadsheet format we can open
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Invalid update interval: must be greater than zero")]
    InvalidUpdateInterval,

    /// No sheet is currently connected
    #[error("Sheet is not connected")]
    NotConnected,

    /// Cell coordinates cannot be addressed by the application
    #[error("Invalid cell position: row {row}, column {column}")]
    InvalidCell { row: u32, column: u32 },

    #[error("Automation error: {0}")]
    Automation(#[from] AutomationError),

    /// The watch loop gave up connecting
    #[error("Failed to connect after {0} attempts")]
    RetriesExhausted(u32),

    /// The workbook was closed while waiting on it
    #[error("Workbook is closed")]
    Closed,

    #[error("Watch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// An error reported by an automation backend.
///
/// Backends convert their own error types into this at the
/// [`Session`](crate::Session) boundary.
#[derive(Debug)]
pub struct AutomationError(Box<dyn std::error::Error + Send + Sync>);

impl AutomationError {
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

impl std::fmt::Display for AutomationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for AutomationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}
