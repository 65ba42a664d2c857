//! Centralized error handling for the autotimer scanner
//!
//! The scan itself is best-effort: individual events never fail a rule, they
//! are classified as skipped with a reason. The types here cover the places
//! where something can genuinely go wrong before or around a scan:
//!
//! - **Configuration**: unreadable or invalid settings files
//! - **Rules**: invalid filter patterns, timespans or registry operations
//! - **Scan**: missing collaborators, an unusable main context
//! - **Recorder**: rejected mutation requests against the recording subsystem

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for rule validation and registry Results
pub type RuleResult<T> = Result<T, RuleError>;

/// Convenience type alias for recording subsystem Results
pub type RecorderResult<T> = Result<T, RecorderError>;
