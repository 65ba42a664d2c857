//! Utility functions for the autotimer scanner
//!
//! - `similarity`: approximate string matching for titles and descriptions
//! - `time`: local time conversions, horizons and overlap arithmetic

pub mod similarity;
pub mod time;
