use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::ScanSettings;
use crate::guide::GuideSource;
use crate::models::{Origin, RecordEntry, AUTOTIMER_TAG};
use crate::recorder::RecorderHandle;

/// Existing recordings grouped by service, built once per scan.
///
/// Entries live in an arena; the per-service lists hold arena positions in
/// the order the recording subsystem reported them. An entry stays listed
/// under the service it was indexed with even if it is later modified.
#[derive(Debug, Clone, Default)]
pub struct TimerIndex {
    entries: Vec<RecordEntry>,
    by_service: HashMap<String, Vec<usize>>,
}

impl TimerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index records as they are, without resolving or cleaning them up
    pub fn from_records(records: impl IntoIterator<Item = RecordEntry>) -> Self {
        let mut index = Self::new();
        for record in records {
            index.push(record);
        }
        index
    }

    /// Build the index from the recording subsystem's live state.
    ///
    /// Every entry's extended description is refreshed from the guide.
    /// Entries without an event id are left out. Entries whose event can't
    /// be resolved are kept but considered stale, and when
    /// `check_eit_and_remove` is set, stale future entries created by the
    /// scanner are removed from the recording subsystem.
    pub async fn populate(
        recorder: &RecorderHandle,
        guide: &dyn GuideSource,
        settings: &ScanSettings,
    ) -> Self {
        let Some(records) = recorder.records().await else {
            warn!("Could not read existing recordings, continuing with an empty index");
            return Self::new();
        };

        let mut index = Self::new();
        let mut stale = Vec::new();

        for mut record in records {
            let Some(event_id) = record.event_id else {
                stale.push(record);
                continue;
            };

            match guide.resolve_event(&record.service, event_id) {
                Some(details) => record.extended_description = details.extended_description,
                None => stale.push(record.clone()),
            }
            index.push(record);
        }

        info!(
            "Indexed {} existing recordings on {} services ({} stale)",
            index.len(),
            index.by_service.len(),
            stale.len()
        );

        if settings.check_eit_and_remove {
            for record in stale {
                let own = record.origin == Origin::SelfManaged
                    || (settings.add_autotimer_to_tags && record.has_tag(AUTOTIMER_TAG));
                // only future recordings; history is kept for duplicate checks
                if !own || !record.is_active() || record.is_running() {
                    continue;
                }
                info!("Removing recording '{}' because its event is gone", record.name);
                match recorder.remove(record.clone()).await {
                    Some(Ok(())) => {}
                    Some(Err(e)) => debug!("Removing '{}' failed: {}", record.name, e),
                    None => debug!("Removing '{}' got no answer", record.name),
                }
            }
        }

        index
    }

    /// Add an entry, returning its arena position
    pub fn push(&mut self, entry: RecordEntry) -> usize {
        let position = self.entries.len();
        self.by_service
            .entry(entry.service.clone())
            .or_default()
            .push(position);
        self.entries.push(entry);
        position
    }

    /// Entries indexed under `service`, with their arena positions
    pub fn for_service<'a>(&'a self, service: &str) -> impl Iterator<Item = (usize, &'a RecordEntry)> + 'a {
        self.by_service
            .get(service)
            .into_iter()
            .flatten()
            .map(move |&position| (position, &self.entries[position]))
    }

    /// Every indexed entry across all services
    pub fn all(&self) -> impl Iterator<Item = &RecordEntry> {
        self.entries.iter()
    }

    pub fn get_mut(&mut self, position: usize) -> Option<&mut RecordEntry> {
        self.entries.get_mut(position)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MainContextConfig;
    use crate::errors::{RecorderError, RecorderResult};
    use crate::models::{Admission, CandidateEvent, EventDetails, RecordPhase, SearchQuery};
    use crate::recorder::{MainContext, Recorder};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::{Arc, Mutex};

    struct FixedGuide;

    impl GuideSource for FixedGuide {
        fn search(&self, _query: &SearchQuery<'_>) -> Vec<CandidateEvent> {
            Vec::new()
        }

        fn resolve_event(&self, service: &str, event_id: u32) -> Option<EventDetails> {
            (event_id < 100).then(|| EventDetails {
                service: service.to_string(),
                event_id,
                begin: Utc.with_ymd_and_hms(2026, 10, 20, 20, 15, 0).unwrap(),
                duration: 5400,
                extended_description: format!("Details {event_id}"),
                linked_services: Vec::new(),
            })
        }
    }

    struct ListRecorder {
        records: Vec<RecordEntry>,
        removed: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder for ListRecorder {
        fn records(&self) -> Vec<RecordEntry> {
            self.records.clone()
        }

        fn admit(&mut self, _entry: &RecordEntry) -> Admission {
            Admission::Conflicts(Vec::new())
        }

        fn time_changed(&mut self, _entry: &RecordEntry) {}

        fn remove(&mut self, entry: &RecordEntry) -> RecorderResult<()> {
            if entry.name == "refuses" {
                return Err(RecorderError::rejected("locked"));
            }
            self.removed.lock().unwrap().push(entry.name.clone());
            Ok(())
        }
    }

    fn record(service: &str, name: &str, event_id: Option<u32>) -> RecordEntry {
        let begin = Utc.with_ymd_and_hms(2026, 10, 20, 20, 15, 0).unwrap();
        let mut record = RecordEntry::new_owned(service, begin, begin + Duration::minutes(90), name, "", 0);
        record.event_id = event_id;
        record
    }

    #[test]
    fn test_grouping_keeps_reported_order() {
        let index = TimerIndex::from_records(vec![
            record("a", "first", Some(1)),
            record("b", "other", Some(2)),
            record("a", "second", Some(3)),
        ]);
        let names: Vec<&str> = index.for_service("a").map(|(_, r)| r.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(index.for_service("missing").count(), 0);
        assert_eq!(index.all().count(), 3);
    }

    #[test]
    fn test_modified_entry_stays_under_original_service() {
        let mut index = TimerIndex::from_records(vec![record("a", "x", Some(1))]);
        let (position, _) = index.for_service("a").next().unwrap();
        index.get_mut(position).unwrap().service = "b".to_string();
        assert_eq!(index.for_service("a").count(), 1);
        assert_eq!(index.for_service("b").count(), 0);
    }

    #[tokio::test]
    async fn test_populate_resolves_and_removes_stale_own_entries() {
        let removed = Arc::new(Mutex::new(Vec::new()));

        let mut foreign = record("a", "foreign stale", Some(200));
        foreign.origin = Origin::Foreign;
        let mut running = record("a", "running stale", Some(201));
        running.phase = RecordPhase::Running;
        let mut history = record("a", "processed stale", Some(202));
        history.phase = RecordPhase::Processed;

        let recorder = ListRecorder {
            records: vec![
                record("a", "resolved", Some(7)),
                record("a", "no event id", None),
                record("b", "own stale", Some(300)),
                record("b", "refuses", Some(301)),
                foreign,
                running,
                history,
            ],
            removed: removed.clone(),
        };
        let context = MainContext::spawn(Box::new(recorder), &MainContextConfig::default());
        let settings = ScanSettings {
            check_eit_and_remove: true,
            ..Default::default()
        };

        let index = TimerIndex::populate(&context.handle(), &FixedGuide, &settings).await;

        // the entry without event id is the only one left out
        assert_eq!(index.len(), 6);
        let resolved = index.for_service("a").next().unwrap().1;
        assert_eq!(resolved.extended_description, "Details 7");
        assert!(index.all().all(|r| r.name != "no event id"));

        // foreign, running and processed entries are never removed
        assert_eq!(
            *removed.lock().unwrap(),
            vec!["no event id".to_string(), "own stale".to_string()]
        );
    }

    #[tokio::test]
    async fn test_populate_without_removal_policy_leaves_recorder_alone() {
        let removed = Arc::new(Mutex::new(Vec::new()));
        let recorder = ListRecorder {
            records: vec![record("b", "own stale", Some(300))],
            removed: removed.clone(),
        };
        let context = MainContext::spawn(Box::new(recorder), &MainContextConfig::default());

        let index = TimerIndex::populate(&context.handle(), &FixedGuide, &ScanSettings::default()).await;
        assert_eq!(index.len(), 1);
        assert!(removed.lock().unwrap().is_empty());
    }
}
