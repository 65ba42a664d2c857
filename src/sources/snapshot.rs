//! JSON snapshot of a receiver
//!
//! A snapshot file bundles the rules, the program guide, the current
//! recordings and the contents of media directories:
//!
//! ```json
//! {
//!   "rules": [{ "id": 1, "name": "Tatort", "match": "Tatort" }],
//!   "events": [{ "service": "1:0:1:6DCA:44D:1:C00000:0:0:0:", "event_id": 7,
//!                "name": "Tatort", "begin": "2026-10-18T18:15:00Z", "duration": 5400 }],
//!   "records": [],
//!   "movies": { "/media/hdd/movie/": [{ "name": "Tatort" }] },
//!   "tuners": 2
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::errors::{AppError, AppResult, RecorderError, RecorderResult};
use crate::guide::{GuideSource, MediaLibrary};
use crate::models::{
    Admission, CandidateEvent, ConflictEntry, EventDetails, MediaItem, RecordEntry, RecordId, Rule,
    SearchCase, SearchQuery, SearchType,
};
use crate::recorder::Recorder;

fn default_tuners() -> usize {
    1
}

/// A guide event as stored in the snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuideEntry {
    #[serde(flatten)]
    pub event: CandidateEvent,
    #[serde(default)]
    pub linked_services: Vec<String>,
    /// Still returned by searches but no longer resolvable
    #[serde(default)]
    pub expired: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub events: Vec<GuideEntry>,
    /// Service group reference to member services
    #[serde(default)]
    pub groups: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub records: Vec<RecordEntry>,
    /// Directory to the recordings it contains
    #[serde(default)]
    pub movies: HashMap<String, Vec<MediaItem>>,
    /// Number of recordings that may overlap before admission conflicts
    #[serde(default = "default_tuners")]
    pub tuners: usize,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            events: Vec::new(),
            groups: HashMap::new(),
            records: Vec::new(),
            movies: HashMap::new(),
            tuners: default_tuners(),
        }
    }
}

impl Snapshot {
    pub fn load(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AppError::snapshot(format!("failed to read {}: {}", path.display(), e)))?;
        let snapshot: Self = serde_json::from_str(&contents)
            .map_err(|e| AppError::snapshot(format!("failed to parse {}: {}", path.display(), e)))?;
        debug!(
            "Loaded snapshot {}: {} rules, {} events, {} records",
            path.display(),
            snapshot.rules.len(),
            snapshot.events.len(),
            snapshot.records.len()
        );
        Ok(snapshot)
    }

    pub fn guide(&self) -> SnapshotGuide {
        SnapshotGuide {
            events: self.events.clone(),
            groups: self.groups.clone(),
        }
    }

    pub fn library(&self) -> SnapshotLibrary {
        SnapshotLibrary {
            movies: self.movies.clone(),
        }
    }

    pub fn recorder(&self) -> SnapshotRecorder {
        SnapshotRecorder::new(self.records.clone(), self.tuners)
    }
}

pub struct SnapshotGuide {
    events: Vec<GuideEntry>,
    groups: HashMap<String, Vec<String>>,
}

impl SnapshotGuide {
    fn matches(query: &SearchQuery<'_>, event: &CandidateEvent) -> bool {
        let fold = query.case == SearchCase::Insensitive;
        let normalize = |text: &str| if fold { text.to_lowercase() } else { text.to_string() };
        let needle = normalize(query.text);

        match query.search_type {
            SearchType::Exact => normalize(&event.name) == needle,
            SearchType::Partial => normalize(&event.name).contains(&needle),
            SearchType::Description => {
                normalize(&event.short_description).contains(&needle)
                    || normalize(&event.extended_description).contains(&needle)
            }
        }
    }
}

impl GuideSource for SnapshotGuide {
    fn search(&self, query: &SearchQuery<'_>) -> Vec<CandidateEvent> {
        self.events
            .iter()
            .filter(|entry| Self::matches(query, &entry.event))
            .map(|entry| entry.event.clone())
            .collect()
    }

    fn resolve_event(&self, service: &str, event_id: u32) -> Option<EventDetails> {
        self.events
            .iter()
            .find(|entry| !entry.expired && entry.event.service == service && entry.event.event_id == event_id)
            .map(|entry| EventDetails {
                service: entry.event.service.clone(),
                event_id: entry.event.event_id,
                begin: entry.event.begin,
                duration: entry.event.duration,
                extended_description: entry.event.extended_description.clone(),
                linked_services: entry.linked_services.clone(),
            })
    }

    fn group_members(&self, group: &str) -> Vec<String> {
        self.groups.get(group).cloned().unwrap_or_default()
    }
}

pub struct SnapshotLibrary {
    movies: HashMap<String, Vec<MediaItem>>,
}

impl MediaLibrary for SnapshotLibrary {
    fn enumerate_directory(&self, path: &Path) -> Option<Vec<MediaItem>> {
        // Unknown directories are empty rather than unreadable
        Some(
            self.movies
                .get(path.to_string_lossy().as_ref())
                .cloned()
                .unwrap_or_default(),
        )
    }
}

/// In-memory recording list with a fixed number of tuners
pub struct SnapshotRecorder {
    records: Vec<RecordEntry>,
    tuners: usize,
    last_id: u64,
}

impl SnapshotRecorder {
    pub fn new(mut records: Vec<RecordEntry>, tuners: usize) -> Self {
        let mut last_id = records.iter().filter_map(|r| r.id).map(|id| id.0).max().unwrap_or(0);
        for record in records.iter_mut().filter(|r| r.id.is_none()) {
            last_id += 1;
            record.id = Some(RecordId(last_id));
        }
        Self {
            records,
            tuners: tuners.max(1),
            last_id,
        }
    }

    fn conflicts_for(&self, entry: &RecordEntry) -> Vec<ConflictEntry> {
        if entry.disabled || entry.justplay {
            return Vec::new();
        }
        let overlapping: Vec<&RecordEntry> = self
            .records
            .iter()
            .filter(|r| r.is_active() && !r.disabled && !r.justplay)
            .filter(|r| entry.id.is_none() || r.id != entry.id)
            .filter(|r| r.begin < entry.end && entry.begin < r.end)
            .collect();

        if overlapping.len() < self.tuners {
            return Vec::new();
        }
        overlapping
            .into_iter()
            .map(|r| ConflictEntry {
                name: r.name.clone(),
                begin: r.begin,
            })
            .collect()
    }

    fn position(&self, entry: &RecordEntry) -> Option<usize> {
        entry.id.and_then(|id| self.records.iter().position(|r| r.id == Some(id)))
    }
}

impl Recorder for SnapshotRecorder {
    fn records(&self) -> Vec<RecordEntry> {
        let mut records = self.records.clone();
        records.sort_by_key(|r| !r.is_active());
        records
    }

    fn admit(&mut self, entry: &RecordEntry) -> Admission {
        let conflicts = self.conflicts_for(entry);
        if !conflicts.is_empty() {
            return Admission::Conflicts(conflicts);
        }

        if let (Some(position), Some(id)) = (self.position(entry), entry.id) {
            self.records[position] = entry.clone();
            return Admission::Accepted { id };
        }

        self.last_id += 1;
        let id = RecordId(self.last_id);
        let mut admitted = entry.clone();
        admitted.id = Some(id);
        self.records.push(admitted);
        Admission::Accepted { id }
    }

    fn check_conflicts(&self, entry: &RecordEntry) -> Option<Vec<ConflictEntry>> {
        Some(self.conflicts_for(entry))
    }

    fn time_changed(&mut self, entry: &RecordEntry) {
        if let Some(position) = self.position(entry) {
            self.records[position] = entry.clone();
        }
    }

    fn remove(&mut self, entry: &RecordEntry) -> RecorderResult<()> {
        let position = self.position(entry).ok_or_else(|| RecorderError::NotFound {
            name: entry.name.clone(),
        })?;
        if self.records[position].is_running() {
            return Err(RecorderError::Running {
                name: entry.name.clone(),
            });
        }
        self.records.remove(position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordPhase;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::io::Write;

    const DAS_ERSTE: &str = "1:0:1:6DCA:44D:1:C00000:0:0:0:";

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, hour, 0, 0).unwrap()
    }

    fn entry(event_id: u32, name: &str, short: &str) -> GuideEntry {
        GuideEntry {
            event: CandidateEvent {
                service: DAS_ERSTE.to_string(),
                event_id,
                name: name.to_string(),
                begin: at(20),
                duration: 5400,
                short_description: short.to_string(),
                extended_description: String::new(),
            },
            linked_services: Vec::new(),
            expired: false,
        }
    }

    fn guide() -> SnapshotGuide {
        let mut expired = entry(3, "Tatort: Borowski", "Krimi");
        expired.expired = true;
        Snapshot {
            events: vec![entry(1, "Tatort", "Krimi"), entry(2, "Polizeiruf 110", "Krimi aus Rostock"), expired],
            groups: HashMap::from([("bouquet".to_string(), vec![DAS_ERSTE.to_string()])]),
            ..Default::default()
        }
        .guide()
    }

    fn query(text: &str, search_type: SearchType, case: SearchCase) -> SearchQuery<'_> {
        SearchQuery { text, search_type, case }
    }

    fn names(events: Vec<CandidateEvent>) -> Vec<String> {
        events.into_iter().map(|e| e.name).collect()
    }

    #[test]
    fn test_search_modes() {
        let guide = guide();
        assert_eq!(
            names(guide.search(&query("tatort", SearchType::Exact, SearchCase::Insensitive))),
            vec!["Tatort"]
        );
        assert_eq!(
            names(guide.search(&query("tatort", SearchType::Partial, SearchCase::Insensitive))),
            vec!["Tatort", "Tatort: Borowski"]
        );
        assert!(guide
            .search(&query("tatort", SearchType::Partial, SearchCase::Sensitive))
            .is_empty());
        assert_eq!(
            names(guide.search(&query("Rostock", SearchType::Description, SearchCase::Sensitive))),
            vec!["Polizeiruf 110"]
        );
    }

    #[test]
    fn test_expired_events_do_not_resolve() {
        let guide = guide();
        assert!(guide.resolve_event(DAS_ERSTE, 1).is_some());
        assert!(guide.resolve_event(DAS_ERSTE, 3).is_none());
        assert!(guide.resolve_event("1:0:1:0:0:0:0:0:0:0:", 1).is_none());
        assert_eq!(guide.group_members("bouquet"), vec![DAS_ERSTE.to_string()]);
        assert!(guide.group_members("unknown").is_empty());
    }

    fn record(name: &str, begin: DateTime<Utc>, hours: i64) -> RecordEntry {
        RecordEntry::new_owned(DAS_ERSTE, begin, begin + Duration::hours(hours), name, "", 1)
    }

    #[test]
    fn test_recorder_conflicts_when_tuners_are_busy() {
        let mut recorder = SnapshotRecorder::new(vec![record("Tagesschau", at(20), 1)], 1);
        assert_eq!(recorder.records()[0].id, Some(RecordId(1)));

        let overlapping = record("Tatort", at(20), 2);
        let conflicts = recorder.check_conflicts(&overlapping).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].name, "Tagesschau");
        assert_eq!(recorder.records().len(), 1);

        match recorder.admit(&overlapping) {
            Admission::Conflicts(list) => assert_eq!(list.len(), 1),
            other => panic!("expected conflicts, got {:?}", other),
        }

        let mut disabled = overlapping.clone();
        disabled.disabled = true;
        assert_eq!(recorder.admit(&disabled).id(), Some(RecordId(2)));

        let later = record("Tagesthemen", at(22), 1);
        assert_eq!(recorder.admit(&later).id(), Some(RecordId(3)));
        assert_eq!(recorder.records().len(), 3);
    }

    #[test]
    fn test_second_tuner_absorbs_overlap() {
        let mut recorder = SnapshotRecorder::new(vec![record("Tagesschau", at(20), 1)], 2);
        assert!(recorder.admit(&record("Tatort", at(20), 2)).id().is_some());
        assert!(recorder.admit(&record("Sportschau", at(20), 1)).conflicts().is_some());
    }

    #[test]
    fn test_remove_and_time_changed() {
        let mut running = record("Tagesschau", at(20), 1);
        running.phase = RecordPhase::Running;
        let mut recorder = SnapshotRecorder::new(vec![running, record("Tatort", at(21), 2)], 2);
        let records = recorder.records();

        assert!(matches!(recorder.remove(&records[0]), Err(RecorderError::Running { .. })));
        assert!(matches!(
            recorder.remove(&record("unknown", at(10), 1)),
            Err(RecorderError::NotFound { .. })
        ));

        let mut moved = records[1].clone();
        moved.begin = at(22);
        recorder.time_changed(&moved);
        assert_eq!(recorder.records()[1].begin, at(22));

        assert!(recorder.remove(&moved).is_ok());
        assert_eq!(recorder.records().len(), 1);
    }

    #[test]
    fn test_processed_records_listed_last() {
        let mut processed = record("Gestern", at(10), 1);
        processed.phase = RecordPhase::Processed;
        let recorder = SnapshotRecorder::new(vec![processed, record("Tatort", at(20), 2)], 1);
        let names: Vec<String> = recorder.records().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Tatort", "Gestern"]);
    }

    #[test]
    fn test_load_snapshot_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "rules": [{{ "id": 1, "name": "Tatort", "match": "Tatort" }}],
                "events": [{{ "service": "{}", "event_id": 7, "name": "Tatort",
                             "begin": "2026-10-18T18:15:00Z", "duration": 5400,
                             "linked_services": ["1:0:1:0:0:0:0:0:0:1:"] }}],
                "movies": {{ "/media/hdd/movie/": [{{ "name": "Tatort" }}] }}
            }}"#,
            DAS_ERSTE
        )
        .unwrap();

        let snapshot = Snapshot::load(file.path()).unwrap();
        assert_eq!(snapshot.tuners, 1);
        assert_eq!(snapshot.rules[0].match_text, "Tatort");
        let details = snapshot.guide().resolve_event(DAS_ERSTE, 7).unwrap();
        assert_eq!(details.linked_services.len(), 1);
        let movies = snapshot
            .library()
            .enumerate_directory(Path::new("/media/hdd/movie/"))
            .unwrap();
        assert_eq!(movies.len(), 1);
        assert!(snapshot
            .library()
            .enumerate_directory(Path::new("/elsewhere"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(Snapshot::load(file.path()), Err(AppError::Snapshot { .. })));
    }
}
