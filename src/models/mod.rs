use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod registry;
pub mod rule;
pub mod scan;

pub use registry::RuleRegistry;
pub use rule::*;
pub use scan::*;

/// Tag attached to recordings created by the scanner when tagging is enabled
pub const AUTOTIMER_TAG: &str = "AutoTimer";

/// One EPG search hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateEvent {
    pub service: String,
    pub event_id: u32,
    pub name: String,
    pub begin: DateTime<Utc>,
    pub duration: i64, // seconds
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub extended_description: String,
}

impl CandidateEvent {
    /// `None` when the duration runs past the representable range
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.begin.checked_add_signed(Duration::try_seconds(self.duration)?)
    }
}

/// Full guide record for an event, as resolved by service and event id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventDetails {
    pub service: String,
    pub event_id: u32,
    pub begin: DateTime<Utc>,
    pub duration: i64,
    #[serde(default)]
    pub extended_description: String,
    /// Alternate services carrying this event; the last one is preferred
    #[serde(default)]
    pub linked_services: Vec<String>,
}

/// Parameters for a guide search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchQuery<'a> {
    pub text: &'a str,
    pub search_type: SearchType,
    pub case: SearchCase,
}

/// An already recorded item found in a destination directory
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaItem {
    pub name: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub extended_description: String,
}

/// Identifier assigned to a recording by the recording subsystem
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RecordId(pub u64);

/// Who created a recording
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Created by this scanner
    SelfManaged,
    /// Created by the user or another tool
    Foreign,
    /// Provenance was not recorded (e.g. restored after a restart)
    #[default]
    Unknown,
}

/// Where a recording is in its lifecycle
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordPhase {
    #[default]
    Scheduled,
    Running,
    Processed,
}

/// Action taken by the receiver once a recording ends
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AfterEvent {
    Auto,
    Nothing,
    Standby,
    DeepStandby,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordLogEntry {
    pub code: u16,
    pub message: String,
}

/// A recording known to the recording subsystem, or about to be offered to it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordEntry {
    #[serde(default)]
    pub id: Option<RecordId>,
    pub service: String,
    #[serde(default)]
    pub event_id: Option<u32>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub extended_description: String,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub origin: Origin,
    #[serde(default)]
    pub phase: RecordPhase,
    #[serde(default)]
    pub repeated: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub after_event: Option<AfterEvent>,
    #[serde(default)]
    pub dirname: Option<PathBuf>,
    #[serde(default)]
    pub justplay: bool,
    #[serde(default)]
    pub vps_enabled: bool,
    #[serde(default)]
    pub vps_overwrite: bool,
    #[serde(default)]
    pub log: Vec<RecordLogEntry>,
}

impl RecordEntry {
    /// A fresh entry owned by the scanner, not yet admitted
    pub fn new_owned(
        service: &str,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
        name: &str,
        description: &str,
        event_id: u32,
    ) -> Self {
        Self {
            id: None,
            service: service.to_string(),
            event_id: Some(event_id),
            name: name.to_string(),
            description: description.to_string(),
            extended_description: String::new(),
            begin,
            end,
            disabled: false,
            origin: Origin::SelfManaged,
            phase: RecordPhase::Scheduled,
            repeated: false,
            tags: Vec::new(),
            after_event: None,
            dirname: None,
            justplay: false,
            vps_enabled: false,
            vps_overwrite: false,
            log: Vec::new(),
        }
    }

    pub fn log(&mut self, code: u16, message: impl Into<String>) {
        self.log.push(RecordLogEntry {
            code,
            message: message.into(),
        });
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn is_running(&self) -> bool {
        self.phase == RecordPhase::Running
    }

    /// Active entries are scheduled or running, as opposed to processed history
    pub fn is_active(&self) -> bool {
        self.phase != RecordPhase::Processed
    }

    /// Overwrite the fields an event binding is allowed to change
    pub fn modify(
        &mut self,
        name: &str,
        description: &str,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
        service: &str,
        event_id: Option<u32>,
    ) {
        self.name = name.to_string();
        self.description = description.to_string();
        self.begin = begin;
        self.end = end;
        self.service = service.to_string();
        if let Some(event_id) = event_id {
            self.event_id = Some(event_id);
        }
    }
}

/// A recording the subsystem reported as conflicting with an admission request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictEntry {
    pub name: String,
    pub begin: DateTime<Utc>,
}

/// Answer of the recording subsystem to an admission request
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Accepted { id: RecordId },
    Conflicts(Vec<ConflictEntry>),
}

impl Admission {
    /// The conflict set, if the request was rejected by a non-empty one
    pub fn conflicts(&self) -> Option<&[ConflictEntry]> {
        match self {
            Admission::Conflicts(conflicts) if !conflicts.is_empty() => Some(conflicts),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<RecordId> {
        match self {
            Admission::Accepted { id } => Some(*id),
            Admission::Conflicts(_) => None,
        }
    }
}
