use std::collections::HashMap;

use crate::models::RecordEntry;

/// Pending record shared by a conflicting event and its substitutes
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarGroup {
    /// The entry that was rejected with conflicts
    pub pending: RecordEntry,
    /// Description of what it conflicted with
    pub conflicts: String,
}

/// Conflict-driven groups of interchangeable events within one rule's pass.
///
/// Each event id maps to at most one group at a time.
#[derive(Debug, Default)]
pub struct SimilarGroups {
    groups: Vec<SimilarGroup>,
    members: HashMap<u32, usize>,
}

impl SimilarGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, event_id: u32) -> bool {
        self.members.contains_key(&event_id)
    }

    pub fn group_of(&self, event_id: u32) -> Option<&SimilarGroup> {
        self.members.get(&event_id).map(|&g| &self.groups[g])
    }

    /// Open a group for `original` and its `substitute`.
    ///
    /// `original` is moved out of any group it belonged to before.
    pub fn claim(&mut self, original: u32, substitute: u32, pending: RecordEntry, conflicts: String) {
        let group = self.groups.len();
        self.groups.push(SimilarGroup { pending, conflicts });
        self.members.insert(original, group);
        self.members.insert(substitute, group);
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.members.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
