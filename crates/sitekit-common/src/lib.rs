//! # SiteKit Common
//!
//! Shared error type, logging configuration, and timeout utilities for the
//! SiteKit offline worker crates.
//!
//! ## Features
//!
//! - Unified error type for configuration and I/O failures
//! - Logging configuration and setup
//! - Timeout wrapper for async operations
//! - Result extension trait

use std::time::Duration;
use thiserror::Error;

pub mod logging;
pub mod timeout;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use timeout::with_timeout;

/// Unified error type for SiteKit.
#[derive(Error, Debug)]
pub enum SiteKitError {
    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON documents.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeout errors.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl SiteKitError {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            SiteKitError::Config { .. } => "config",
            SiteKitError::Io(_) => "io",
            SiteKitError::Json(_) => "json",
            SiteKitError::Timeout(_) => "timeout",
            SiteKitError::InvalidArgument(_) => "invalid_argument",
        }
    }
}

/// Result type alias for SiteKit operations.
pub type Result<T> = std::result::Result<T, SiteKitError>;

/// Extension trait for Result.
pub trait ResultExt<T> {
    /// Wrap any error as a configuration error with context.
    fn config_context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn config_context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| SiteKitError::config_with_source(message, e))
    }
}
