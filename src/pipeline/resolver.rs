//! Commits accepted decisions to the recording subsystem
//!
//! Bound decisions update the existing recording in place. New decisions are
//! offered for admission; when admission reports conflicts, a near-duplicate
//! broadcast of the same rule may be claimed as a substitute through a
//! [`SimilarGroup`](super::SimilarGroup).

use chrono_tz::Tz;
use std::collections::VecDeque;
use tracing::{info, warn};

use super::duplicates::{is_duplicate, Broadcast};
use super::filter::Decision;
use super::similar::SimilarGroups;
use crate::config::{RefreshPolicy, ScanSettings};
use crate::index::TimerIndex;
use crate::models::{
    CandidateEvent, ConflictEntry, Origin, RecordEntry, Rule, ScanOutcome, AUTOTIMER_TAG,
};
use crate::recorder::RecorderHandle;
use crate::utils::time::{format_compact, to_local};

/// Record log codes
pub const LOG_ADD: u16 = 500;
pub const LOG_MODIFY: u16 = 501;
pub const LOG_DISABLED: u16 = 503;
pub const LOG_SIMILAR: u16 = 504;

/// State of one rule's pass over its candidates.
///
/// The candidate list is fixed when the pass starts. Substitutes that must
/// be looked at again are queued separately and visited after the list.
#[derive(Debug)]
pub struct RulePass {
    snapshot: Vec<CandidateEvent>,
    cursor: usize,
    reprocess: VecDeque<usize>,
    pub groups: SimilarGroups,
    pub outcome: ScanOutcome,
}

impl RulePass {
    /// Start a pass over `candidates`, ordered by begin time (stable)
    pub fn new(mut candidates: Vec<CandidateEvent>) -> Self {
        candidates.sort_by_key(|c| c.begin);
        Self {
            snapshot: candidates,
            cursor: 0,
            reprocess: VecDeque::new(),
            groups: SimilarGroups::new(),
            outcome: ScanOutcome::default(),
        }
    }

    /// Position of the next candidate to evaluate
    pub fn next_position(&mut self) -> Option<usize> {
        if self.cursor < self.snapshot.len() {
            self.cursor += 1;
            return Some(self.cursor - 1);
        }
        self.reprocess.pop_front()
    }

    pub fn event(&self, position: usize) -> &CandidateEvent {
        &self.snapshot[position]
    }

    /// Queue a snapshot position to be evaluated again
    pub fn requeue(&mut self, position: usize) {
        self.reprocess.push_back(position);
    }

    /// First near-duplicate of `decision` searching forward from `position`,
    /// wrapping around and never returning `position` itself
    pub fn find_substitute(&self, position: usize, rule: &Rule, decision: &Decision) -> Option<usize> {
        let len = self.snapshot.len();
        (1..len)
            .map(|offset| (position + offset) % len)
            .find(|&candidate| {
                let event = &self.snapshot[candidate];
                is_duplicate(
                    rule,
                    decision.broadcast(),
                    Broadcast::new(&event.name, &event.short_description, &event.extended_description),
                    true,
                )
            })
    }

    pub fn into_outcome(self) -> ScanOutcome {
        self.outcome
    }
}

/// `"name (YYYYmmdd HHMM)"` per conflict, joined by `" / "`
pub fn describe_conflicts(conflicts: &[ConflictEntry], tz: Tz) -> String {
    conflicts
        .iter()
        .map(|c| format!("{} ({})", c.name, format_compact(tz, c.begin)))
        .collect::<Vec<_>>()
        .join(" / ")
}

pub struct ConflictResolver<'a> {
    settings: &'a ScanSettings,
    tz: Tz,
    recorder: &'a RecorderHandle,
    simulate: bool,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(settings: &'a ScanSettings, tz: Tz, recorder: &'a RecorderHandle, simulate: bool) -> Self {
        Self {
            settings,
            tz,
            recorder,
            simulate,
        }
    }

    /// Record the decision as a timer and, unless simulating, apply it
    pub async fn commit(
        &self,
        rule: &mut Rule,
        decision: Decision,
        position: usize,
        pass: &mut RulePass,
        timers: &mut TimerIndex,
    ) {
        pass.outcome.timers.push(decision.tuple(rule, true));

        if self.simulate {
            self.probe(rule, decision, pass).await;
            return;
        }

        match decision.binding {
            Some(bound) => self.update(rule, decision, bound, pass, timers).await,
            None => self.add(rule, decision, position, pass, timers).await,
        }
    }

    /// Rule-level fields shared by new and modified entries
    fn apply_rule(&self, entry: &mut RecordEntry, rule: &Rule, decision: &Decision) {
        if let Some(action) = rule.after_event_for(&to_local(self.tz, decision.end)) {
            entry.after_event = Some(action);
        }
        entry.dirname = Some(decision.destination.clone());
        entry.justplay = rule.justplay;
        entry.vps_enabled = rule.vps_enabled;
        entry.vps_overwrite = rule.vps_overwrite;

        let mut tags = rule.tags.clone();
        if self.settings.add_autotimer_to_tags && !tags.iter().any(|t| t == AUTOTIMER_TAG) {
            tags.push(AUTOTIMER_TAG.to_string());
        }
        if self.settings.add_name_to_tags {
            if let Some(tag) = rule.name_tag() {
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }
        entry.tags = tags;
    }

    fn new_entry(&self, rule: &Rule, decision: &Decision) -> RecordEntry {
        let mut entry = RecordEntry::new_owned(
            &decision.service,
            decision.begin,
            decision.end,
            &decision.name,
            &decision.short_description,
            decision.event_id,
        );
        self.apply_rule(&mut entry, rule, decision);
        entry
    }

    async fn update(
        &self,
        rule: &Rule,
        mut decision: Decision,
        bound: usize,
        pass: &mut RulePass,
        timers: &mut TimerIndex,
    ) {
        let Some(entry) = timers.get_mut(bound) else {
            warn!("Bound recording {} vanished from the index", bound);
            return;
        };

        if self.settings.refresh == RefreshPolicy::None || entry.repeated {
            decision
                .trace
                .log("Won't modify existing recording because either no modification allowed or repeated");
            return;
        }

        let own = entry.origin == Origin::SelfManaged
            || (self.settings.add_autotimer_to_tags && entry.has_tag(AUTOTIMER_TAG));
        if own {
            let msg = format!("Rule {} modified this automatically generated recording.", rule.name);
            decision.trace.log(msg.as_str());
            entry.log(LOG_MODIFY, msg);
        } else {
            if self.settings.refresh != RefreshPolicy::All {
                decision
                    .trace
                    .log("Won't modify existing recording because it's not set by us");
                return;
            }
            let msg = format!(
                "Warning, rule {} messed with a recording which might not belong to it: {}.",
                rule.name, entry.name
            );
            warn!("{}", msg);
            decision.trace.log(msg.as_str());
            entry.log(LOG_MODIFY, msg);
        }

        pass.outcome.modified += 1;

        if decision.allow_modify {
            entry.modify(
                &decision.name,
                &decision.short_description,
                decision.begin,
                decision.end,
                &decision.service,
                Some(decision.event_id),
            );
            let msg = format!("Modified recording: {}.", entry.name);
            decision.trace.log(msg.as_str());
            entry.log(LOG_MODIFY, msg);
        } else {
            decision
                .trace
                .log(format!("Modification not allowed for recording: {}.", entry.name));
        }

        self.apply_rule(entry, rule, &decision);
        let updated = entry.clone();
        self.recorder.time_changed(updated).await;
    }

    async fn add(
        &self,
        rule: &mut Rule,
        mut decision: Decision,
        position: usize,
        pass: &mut RulePass,
        timers: &mut TimerIndex,
    ) {
        let mut entry = self.new_entry(rule, &decision);
        let msg = format!("Try to add new recording based on rule {}.", rule.name);
        decision.trace.log(msg.as_str());
        entry.log(LOG_ADD, msg);

        let mut similar = decision.similar;
        let mut conflicts = String::new();
        if similar {
            if let Some(group) = pass.groups.group_of(decision.event_id) {
                conflicts = group.conflicts.clone();
            }
            let msg = format!("Try to add similar recording because of conflicts with {conflicts}.");
            decision.trace.log(msg.as_str());
            entry.log(LOG_SIMILAR, msg);
        }

        let Some(admission) = self.recorder.admit(entry.clone()).await else {
            decision.trace.log("No answer from the recording subsystem");
            return;
        };

        let Some(found) = admission.conflicts() else {
            entry.id = admission.id();
            rule.decrement_counter();
            pass.outcome.new += 1;
            entry.extended_description = decision.extended_description.clone();
            timers.push(entry);
            info!("Added recording '{}' on {}", decision.name, decision.service);

            // similar recordings are listed as new and as similar
            if similar {
                pass.outcome.similars.push(decision.tuple(rule, false));
                pass.groups.clear();
            }
            return;
        };

        conflicts.push_str(&describe_conflicts(found, self.tz));
        decision.trace.log(format!("Conflict with {conflicts} detected"));

        if self.settings.add_similar_on_conflict {
            if let Some(substitute) = pass.find_substitute(position, rule, &decision) {
                let (sub_id, sub_begin) = {
                    let event = pass.event(substitute);
                    (event.event_id, event.begin)
                };
                if !pass.groups.contains(sub_id) {
                    decision.trace.log(format!("Found similar event {sub_id}"));
                    pass.groups
                        .claim(decision.event_id, sub_id, entry.clone(), conflicts.clone());
                    similar = true;
                    // already passed over; evaluate it again
                    if sub_begin <= decision.event_begin {
                        pass.requeue(substitute);
                    }
                } else {
                    similar = false;
                    if let Some(group) = pass.groups.group_of(sub_id) {
                        entry = group.pending.clone();
                    }
                }
            }
        }

        if similar {
            return;
        }

        pass.outcome.conflicting.push(decision.tuple(rule, false));

        if self.settings.disabled_on_conflict {
            let msg = format!("Recording disabled because of conflicts with {conflicts}.");
            decision.trace.log(msg.as_str());
            entry.log(LOG_DISABLED, msg);
            entry.disabled = true;
            let _ = self.recorder.admit(entry).await;
        }
    }

    /// Classify a would-be new recording without changing anything
    async fn probe(&self, rule: &Rule, decision: Decision, pass: &mut RulePass) {
        if decision.binding.is_some() {
            return;
        }
        let entry = self.new_entry(rule, &decision);
        if let Some(conflicts) = self.recorder.check_conflicts(entry).await {
            if !conflicts.is_empty() {
                let mut decision = decision;
                decision.trace.log(format!(
                    "Would conflict with {}",
                    describe_conflicts(&conflicts, self.tz)
                ));
                pass.outcome.conflicting.push(decision.tuple(rule, false));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::trace::EventTrace;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::path::PathBuf;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 20, hour, 0, 0).unwrap()
    }

    fn candidate(event_id: u32, name: &str, begin: DateTime<Utc>) -> CandidateEvent {
        CandidateEvent {
            service: "svc".to_string(),
            event_id,
            name: name.to_string(),
            begin,
            duration: 3600,
            short_description: String::new(),
            extended_description: String::new(),
        }
    }

    fn decision(event_id: u32, name: &str, begin: DateTime<Utc>) -> Decision {
        Decision {
            event_id,
            name: name.to_string(),
            short_description: String::new(),
            extended_description: String::new(),
            service: "svc".to_string(),
            event_begin: begin,
            begin,
            end: begin + Duration::hours(1),
            destination: PathBuf::from("/media/hdd/movie"),
            binding: None,
            allow_modify: true,
            similar: false,
            trace: EventTrace::new(),
        }
    }

    #[test]
    fn test_pass_orders_by_begin_and_is_stable() {
        let mut pass = RulePass::new(vec![
            candidate(1, "late", at(22)),
            candidate(2, "early a", at(18)),
            candidate(3, "early b", at(18)),
        ]);
        let mut order = Vec::new();
        while let Some(position) = pass.next_position() {
            order.push(pass.event(position).event_id);
        }
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_requeued_positions_follow_the_snapshot_in_fifo_order() {
        let mut pass = RulePass::new(vec![candidate(1, "a", at(18)), candidate(2, "b", at(19))]);
        assert_eq!(pass.next_position(), Some(0));
        pass.requeue(1);
        pass.requeue(0);
        pass.requeue(1);
        let rest: Vec<usize> = std::iter::from_fn(|| pass.next_position()).collect();
        assert_eq!(rest, vec![1, 1, 0, 1]);
    }

    #[test]
    fn test_substitute_search_wraps_and_skips_itself() {
        let rule = Rule::new(1, "Tatort", "Tatort");
        let pass = RulePass::new(vec![
            candidate(1, "Tatort", at(18)),
            candidate(2, "Polizeiruf 110", at(19)),
            candidate(3, "Tatort", at(20)),
        ]);

        // forward from the last position wraps to the first
        assert_eq!(pass.find_substitute(2, &rule, &decision(3, "Tatort", at(20))), Some(0));
        assert_eq!(pass.find_substitute(0, &rule, &decision(1, "Tatort", at(18))), Some(2));

        let lonely = RulePass::new(vec![candidate(1, "Tatort", at(18))]);
        assert_eq!(lonely.find_substitute(0, &rule, &decision(1, "Tatort", at(18))), None);
    }

    #[test]
    fn test_describe_conflicts_uses_local_time() {
        let conflicts = vec![
            ConflictEntry {
                name: "Tagesschau".to_string(),
                begin: at(18),
            },
            ConflictEntry {
                name: "Sportschau".to_string(),
                begin: at(19),
            },
        ];
        assert_eq!(
            describe_conflicts(&conflicts, chrono_tz::Europe::Berlin),
            "Tagesschau (20261020 2000) / Sportschau (20261020 2100)"
        );
        assert_eq!(describe_conflicts(&[], chrono_tz::UTC), "");
    }
}
