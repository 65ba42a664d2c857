//! Concrete collaborator implementations
//!
//! The scanner only depends on the traits in [`crate::guide`] and
//! [`crate::recorder`]. This module provides implementations backed by a JSON
//! snapshot of a receiver's guide, recordings and media directories.

pub mod snapshot;

pub use snapshot::{GuideEntry, Snapshot, SnapshotGuide, SnapshotLibrary, SnapshotRecorder};
