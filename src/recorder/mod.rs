//! The recording subsystem boundary
//!
//! A [`Recorder`] may only be touched from the main context. Scans reach it
//! through a [`RecorderHandle`], which marshals every call onto the task that
//! owns the recorder.

use crate::errors::RecorderResult;
use crate::models::{Admission, ConflictEntry, RecordEntry};

pub mod main_context;

pub use main_context::{MainContext, RecorderHandle};

/// Scheduled and processed recordings, plus admission of new ones
pub trait Recorder: Send + 'static {
    /// Active entries followed by processed ones
    fn records(&self) -> Vec<RecordEntry>;

    /// Offer an entry for scheduling
    fn admit(&mut self, entry: &RecordEntry) -> Admission;

    /// Conflicts `entry` would run into, without scheduling it.
    /// `None` when the subsystem can't tell.
    fn check_conflicts(&self, _entry: &RecordEntry) -> Option<Vec<ConflictEntry>> {
        None
    }

    /// Reconcile an existing entry whose fields were changed
    fn time_changed(&mut self, entry: &RecordEntry);

    fn remove(&mut self, entry: &RecordEntry) -> RecorderResult<()>;
}
