use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A classified event: what was (or would be) recorded, conflicted or found similar
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventTuple {
    pub name: String,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub service: String,
    pub rule_name: String,
    /// Diagnostic lines collected while the event was evaluated
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<String>,
}

/// Per-rule accumulation of scan decisions
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanOutcome {
    pub new: usize,
    pub modified: usize,
    pub timers: Vec<EventTuple>,
    pub conflicting: Vec<EventTuple>,
    pub similars: Vec<EventTuple>,
    pub skipped: Vec<EventTuple>,
}

/// Incremental result handed to a streaming callback after each rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleReport {
    pub rule_id: u32,
    pub rule_name: String,
    #[serde(flatten)]
    pub outcome: ScanOutcome,
}

/// Scan-wide result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanResult {
    pub scan_id: Uuid,
    pub simulated: bool,
    /// Number of timers across all rules, including streamed ones
    pub total: usize,
    pub new: usize,
    pub modified: usize,
    pub timers: Vec<EventTuple>,
    pub conflicting: Vec<EventTuple>,
    pub similars: Vec<EventTuple>,
    pub skipped: Vec<EventTuple>,
}

impl ScanResult {
    pub fn new(simulated: bool) -> Self {
        Self {
            scan_id: Uuid::new_v4(),
            simulated,
            total: 0,
            new: 0,
            modified: 0,
            timers: Vec::new(),
            conflicting: Vec::new(),
            similars: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Fold one rule's counts in, and its lists unless they were streamed out
    pub fn absorb(&mut self, outcome: ScanOutcome, keep_lists: bool) {
        self.new += outcome.new;
        self.modified += outcome.modified;
        self.total += outcome.timers.len();
        if keep_lists {
            self.timers.extend(outcome.timers);
            self.conflicting.extend(outcome.conflicting);
            self.similars.extend(outcome.similars);
            self.skipped.extend(outcome.skipped);
        }
    }
}
