//! Error type definitions for the autotimer scanner
//!
//! Mirrors the layering of the application: a top-level `AppError` that
//! wraps the errors of each layer, with `thiserror` providing the trait
//! implementations and error chaining.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration loading errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Scan setup errors
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// Rule validation and registry errors
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    /// Snapshot input errors
    #[error("Snapshot error: {message}")]
    Snapshot { message: String },

    /// Filesystem errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML encoding errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),
}

/// Errors that prevent a scan cycle from starting
#[derive(Error, Debug)]
pub enum ScanError {
    /// The recording subsystem was never attached
    #[error("Recording subsystem is not available, can't parse EPG")]
    RecorderUnavailable,

    /// The main context task has already stopped
    #[error("Main context is closed")]
    MainContextClosed,

    /// The configured timezone is not a known IANA name
    #[error("Invalid timezone: {name}")]
    InvalidTimezone { name: String },
}

/// Rule validation and registry errors
#[derive(Error, Debug)]
pub enum RuleError {
    /// A filter pattern failed to compile
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A timespan bound is out of range
    #[error("Invalid timespan bound {hour:02}:{minute:02}")]
    InvalidTimespan { hour: u32, minute: u32 },

    /// Two rules share the same id
    #[error("Duplicate rule id {id}")]
    DuplicateId { id: u32 },

    /// No rule with this id exists
    #[error("Rule {id} not found")]
    NotFound { id: u32 },
}

/// Errors returned by the recording subsystem for mutation requests
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecorderError {
    /// The entry is not known to the recording subsystem
    #[error("Recording '{name}' not found")]
    NotFound { name: String },

    /// The entry is currently recording and can't be touched
    #[error("Recording '{name}' is currently running")]
    Running { name: String },

    /// The subsystem refused the request
    #[error("Request rejected: {message}")]
    Rejected { message: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a snapshot error with a custom message
    pub fn snapshot<S: Into<String>>(message: S) -> Self {
        Self::Snapshot {
            message: message.into(),
        }
    }
}

impl RuleError {
    /// Create an invalid pattern error
    pub fn invalid_pattern<P: Into<String>, M: Into<String>>(pattern: P, message: M) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: message.into(),
        }
    }
}

impl RecorderError {
    /// Create a rejected error
    pub fn rejected<S: Into<String>>(message: S) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}
