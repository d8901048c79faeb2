//! Unified error handling for marionette
//!
//! This module provides the top-level error type surfaced by the export
//! pipeline. Recoverable misses (a model that failed every fallback path, a
//! material no mesh could be matched to) are logged and skipped by the
//! components themselves; only fatal conditions travel through this type.

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for marionette operations
#[derive(Error, Debug)]
pub enum Error {
    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Invalid data structure
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Missing required field
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// A resource-graph snapshot could not be understood
    #[error("Invalid snapshot: {message}")]
    InvalidSnapshot { message: String },

    /// Skeleton resolution failed in a way that prevents any export
    #[error("Skeleton resolution failed: {message}")]
    SkeletonResolution { message: String },

    /// Scene serialization or another unrecoverable export step failed
    #[error("Export failed: {message}")]
    ExportFailed { message: String },

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal error (should not happen)
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// Custom error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },

    /// External error (from other crates)
    #[error("{0}")]
    External(String),
}

/// Result type using the unified Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Error::InvalidData {
            message: message.into(),
        }
    }

    /// Create an export failure from any displayable cause
    pub fn export_failed(message: impl Into<String>) -> Self {
        Error::ExportFailed {
            message: message.into(),
        }
    }

    /// Check if this is a "not found" type error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::FileNotFound(_))
    }

    /// Check if this error means the operation was cancelled
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
