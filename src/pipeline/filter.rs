//! Ordered exclusion checks applied to every candidate event of a rule
//!
//! A candidate either ends up skipped with the trace explaining why, or
//! accepted as a [`Decision`]: bound to an existing recording for
//! modification, or new. The checks run in a fixed order and the first one
//! that rejects wins.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::path::PathBuf;
use tracing::warn;

use super::duplicates::{is_duplicate, Broadcast};
use super::trace::EventTrace;
use crate::config::{MarginConfig, ScanSettings};
use crate::guide::{EnrichmentRequest, GuideSource, MediaLibrary, SeriesEnricher};
use crate::index::{MovieIndex, TimerIndex};
use crate::models::{CandidateEvent, EventTuple, RecordEntry, Rule};
use crate::utils::time::{overlap_seconds, to_local, weekday_index, widen_window};

/// Events starting sooner than this are left alone
const MIN_LEAD_TIME_SECS: i64 = 60;

/// Everything the checks read besides the rule and the indexes
#[derive(Clone, Copy)]
pub struct FilterContext<'a> {
    pub settings: &'a ScanSettings,
    pub margins: &'a MarginConfig,
    pub tz: Tz,
    pub now: DateTime<Utc>,
    /// Latest accepted begin time, if a horizon is configured
    pub horizon: Option<DateTime<Utc>>,
    pub guide: &'a dyn GuideSource,
    pub library: &'a dyn MediaLibrary,
    pub enricher: Option<&'a dyn SeriesEnricher>,
}

/// A candidate that passed every check
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub event_id: u32,
    pub name: String,
    pub short_description: String,
    pub extended_description: String,
    pub service: String,
    /// Begin of the event itself, before margins
    pub event_begin: DateTime<Utc>,
    /// Recording window, margins applied
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub destination: PathBuf,
    /// Position of the existing recording this event is bound to
    pub binding: Option<usize>,
    /// False when series enrichment was requested but found nothing
    pub allow_modify: bool,
    /// Member of a similar group opened by an earlier conflict
    pub similar: bool,
    pub trace: EventTrace,
}

impl Decision {
    pub fn broadcast(&self) -> Broadcast<'_> {
        Broadcast::new(&self.name, &self.short_description, &self.extended_description)
    }

    pub fn tuple(&self, rule: &Rule, with_trace: bool) -> EventTuple {
        EventTuple {
            name: self.name.clone(),
            begin: self.begin,
            end: self.end,
            service: self.service.clone(),
            rule_name: rule.name.clone(),
            trace: if with_trace { self.trace.to_vec() } else { Vec::new() },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Skip(EventTuple),
    Accept(Decision),
}

/// Where the evaluation of one candidate currently stands
struct Evaluation {
    name: String,
    service: String,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
    trace: EventTrace,
}

impl Evaluation {
    fn new(event: &CandidateEvent, end: DateTime<Utc>) -> Self {
        Self {
            name: event.name.clone(),
            service: event.service.clone(),
            begin: event.begin,
            end,
            trace: EventTrace::new(),
        }
    }

    fn skip(mut self, rule: &Rule, reason: &str) -> Verdict {
        self.trace.log(format!("Skipping an event because {reason}"));
        Verdict::Skip(EventTuple {
            name: self.name,
            begin: self.begin,
            end: self.end,
            service: self.service,
            rule_name: rule.name.clone(),
            trace: self.trace.to_vec(),
        })
    }
}

pub struct EventFilterPipeline<'a> {
    ctx: FilterContext<'a>,
}

impl<'a> EventFilterPipeline<'a> {
    pub fn new(ctx: FilterContext<'a>) -> Self {
        Self { ctx }
    }

    /// Run every check for `event`.
    ///
    /// `similar` marks an event claimed by a similar group, which bypasses
    /// the horizon and the day and time windows. The rule's counter is
    /// brought up to date with the event's begin time along the way.
    pub fn evaluate(
        &self,
        rule: &mut Rule,
        event: &CandidateEvent,
        similar: bool,
        timers: &TimerIndex,
        movies: &mut MovieIndex,
    ) -> Verdict {
        let ctx = &self.ctx;
        let event_begin = event.begin;
        let Some(event_end) = event.end() else {
            warn!(
                "Event '{}' on {} has an out of range duration of {}s",
                event.name, event.service, event.duration
            );
            return Evaluation::new(event, event_begin).skip(rule, "its duration is out of range");
        };

        let mut eval = Evaluation::new(event, event_end);
        eval.trace.log(format!("Possible match {}", event.name));
        eval.trace.log(format!("Service {}", event.service));

        let Some(details) = ctx.guide.resolve_event(&event.service, event.event_id) else {
            return eval.skip(rule, "it could not be resolved in the guide");
        };

        if let Some(linked) = details.linked_services.last() {
            eval.service = linked.clone();
            eval.trace.log(format!("Linked service {}", eval.service));
        }

        if event_begin < ctx.now + Duration::seconds(MIN_LEAD_TIME_SECS) {
            return eval.skip(rule, "it starts in less than 60 seconds");
        }

        let local = to_local(ctx.tz, event_begin);
        rule.update_counter(event_begin, &local);

        let day_of_week = if similar {
            eval.trace.log("Similar event, ignoring day and time limits");
            None
        } else {
            if ctx.horizon.is_some_and(|horizon| event_begin > horizon) {
                return eval.skip(rule, "the maximum days in future is reached");
            }
            Some(weekday_index(&local))
        };

        let members = |group: &str| ctx.guide.group_members(group);

        if rule.excludes_service(&eval.service, &members) {
            return eval.skip(rule, "of the service check");
        }
        if rule.excludes_duration(event.duration) {
            return eval.skip(rule, "of the duration check");
        }
        if !similar {
            if rule.excludes_timespan(&local) {
                return eval.skip(rule, "of the timespan check");
            }
            if rule.excludes_timeframe(event_begin, ctx.tz) {
                return eval.skip(rule, "of the timeframe check");
            }
        }

        if rule.override_alternatives {
            if let Some(alternative) = rule.alternative_for(&eval.service, &members) {
                eval.service = alternative;
                eval.trace.log(format!("Using alternative {}", eval.service));
            }
        }

        let mut short = event.short_description.clone();
        let mut destination = rule
            .destination
            .clone()
            .unwrap_or_else(|| ctx.settings.default_path.clone());
        let mut allow_modify = true;

        if let (true, Some(enricher)) = (rule.series_labeling, ctx.enricher) {
            allow_modify = false;
            let mut lookups = vec![eval.name.clone()];
            if rule.name.to_lowercase() != rule.match_text.to_lowercase() {
                lookups.push(rule.name.clone());
            }
            for lookup in lookups {
                let request = EnrichmentRequest {
                    service: &eval.service,
                    name: &lookup,
                    begin: event_begin,
                    end: event_end,
                    short_description: &short,
                    destination: &destination,
                };
                let Some(found) = enricher.season_episode(&request) else {
                    eval.trace.log(format!("No season/episode found for {lookup}"));
                    continue;
                };
                for line in found.trace {
                    eval.trace.log(line);
                }
                if let Some(name) = found.name.filter(|n| !n.is_empty()) {
                    eval.name = name;
                }
                if let Some(desc) = found.short_description.filter(|d| !d.is_empty()) {
                    short = desc;
                }
                if let Some(dest) = found.destination.filter(|d| !d.as_os_str().is_empty()) {
                    destination = dest;
                }
                allow_modify = true;
                break;
            }
        }

        let extended = event.extended_description.as_str();
        if rule.excludes_text(&eval.name, &short, extended, day_of_week) {
            return eval.skip(rule, "of the filter check");
        }

        let window = if rule.has_offset() {
            rule.apply_offset(eval.begin, eval.end)
        } else {
            let (before, after) = ctx.margins.for_service(&event.service);
            widen_window(eval.begin, eval.end, before, after)
        };
        let Some((begin, end)) = window else {
            warn!(
                "Rule '{}' pushes the recording window of '{}' out of range",
                rule.name, event.name
            );
            return eval.skip(rule, "its recording window is out of range");
        };
        (eval.begin, eval.end) = (begin, end);
        if rule.justplay && !rule.set_endtime {
            eval.end = eval.begin;
        }

        let current = Broadcast::new(&eval.name, &short, extended);

        if rule.avoid_duplicate_description == 3 && !destination.as_os_str().is_empty() {
            let recorded = movies
                .movies(&destination, ctx.library)
                .iter()
                .any(|movie| {
                    is_duplicate(
                        rule,
                        current,
                        Broadcast::new(&movie.name, &movie.short_description, &movie.extended_description),
                        true,
                    )
                });
            if recorded {
                return eval.skip(rule, "the movie already exists");
            }
        }

        // margins are removed again before comparing windows
        let (guess_before, guess_after) = match rule.offset {
            Some(offset) => (offset.before.saturating_mul(60), offset.after.saturating_mul(60)),
            None => ctx.margins.global(),
        };
        let min_overlap = (event.duration / 10) * 8;

        let mut binding = None;
        let mut covered = false;
        for (position, existing) in timers.for_service(&eval.service) {
            if existing.event_id == Some(event.event_id) {
                eval.trace.log("Found a recording based on event id");
                binding = Some(position);
                break;
            }
            if ctx.settings.try_guessing {
                let window = widen_window(
                    existing.begin,
                    existing.end,
                    guess_before.saturating_neg(),
                    guess_after.saturating_neg(),
                );
                if window.is_some_and(|(begin, end)| overlap_seconds(begin, end, event_begin, event_end) > min_overlap) {
                    eval.trace.log("Found a recording based on time guessing");
                    binding = Some(position);
                    break;
                }
            }
            if rule.avoid_duplicate_description >= 1
                && !existing.disabled
                && is_duplicate(rule, current, existing_broadcast(existing), false)
            {
                eval.trace.log("Found a recording on the same service with the same description");
                covered = true;
                break;
            }
        }

        if binding.is_none() {
            if covered {
                return eval.skip(rule, "a recording on the same service exists");
            }

            if rule.avoid_duplicate_description >= 2
                && timers
                    .all()
                    .filter(|existing| !existing.disabled)
                    .any(|existing| is_duplicate(rule, current, existing_broadcast(existing), false))
            {
                eval.trace.log("Found a recording on another service with the same description");
                return eval.skip(rule, "a recording on any service exists");
            }

            if rule.counter_exhausted(&local) {
                return eval.skip(rule, "the counter is depleted");
            }
        }

        Verdict::Accept(Decision {
            event_id: event.event_id,
            name: eval.name,
            short_description: short,
            extended_description: event.extended_description.clone(),
            service: eval.service,
            event_begin,
            begin: eval.begin,
            end: eval.end,
            destination,
            binding,
            allow_modify,
            similar,
            trace: eval.trace,
        })
    }
}

fn existing_broadcast(entry: &RecordEntry) -> Broadcast<'_> {
    Broadcast::new(&entry.name, &entry.description, &entry.extended_description)
}
