//! Recording rules ("autotimers") and the per-rule checks the filter
//! pipeline applies to candidate events.
//!
//! Every `excludes_*` method answers the question "does this rule reject the
//! event?", so `true` means skip.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::AfterEvent;
use crate::errors::{RuleError, RuleResult};
use crate::utils::time::{local_midnight, widen_window};

/// How the rule's match text is used to search the guide
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Exact,
    #[default]
    Partial,
    Description,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchCase {
    Sensitive,
    #[default]
    Insensitive,
}

/// Custom recording margins in minutes
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Offset {
    pub before: i64,
    pub after: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Self {
        Self { hour, minute }
    }

    pub fn of(local: &DateTime<Tz>) -> Self {
        Self::new(local.hour(), local.minute())
    }

    fn validate(&self) -> RuleResult<()> {
        if self.hour > 23 || self.minute > 59 {
            return Err(RuleError::InvalidTimespan {
                hour: self.hour,
                minute: self.minute,
            });
        }
        Ok(())
    }
}

/// Daily time-of-day window; `from > to` spans midnight
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timespan {
    pub from: TimeOfDay,
    pub to: TimeOfDay,
}

impl Timespan {
    pub fn spans_midnight(&self) -> bool {
        self.from > self.to
    }

    pub fn excludes(&self, at: TimeOfDay) -> bool {
        if self.spans_midnight() {
            !(at >= self.from || at <= self.to)
        } else {
            at < self.from || at > self.to
        }
    }
}

/// Inclusive range of local dates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timeframe {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl Timeframe {
    pub fn excludes(&self, begin: DateTime<Utc>, tz: Tz) -> bool {
        let start = local_midnight(tz, self.from);
        let end = local_midnight(tz, self.to.succ_opt().unwrap_or(self.to));
        !(begin > start && begin < end)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceFilter {
    /// Services or service groups (bouquets, alternatives) to search on
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

/// Event duration limits in minutes
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DurationBounds {
    #[serde(default)]
    pub min_minutes: Option<i64>,
    #[serde(default)]
    pub max_minutes: Option<i64>,
}

impl DurationBounds {
    pub fn excludes(&self, duration_secs: i64) -> bool {
        if let Some(max) = self.max_minutes {
            if duration_secs > max * 60 {
                return true;
            }
        }
        if let Some(min) = self.min_minutes {
            if duration_secs < min * 60 {
                return true;
            }
        }
        false
    }
}

/// A compiled regular expression that serializes as its source text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FilterPattern {
    source: String,
    regex: Regex,
}

impl FilterPattern {
    pub fn new(pattern: &str) -> RuleResult<Self> {
        let regex =
            Regex::new(pattern).map_err(|e| RuleError::invalid_pattern(pattern, e.to_string()))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl TryFrom<String> for FilterPattern {
    type Error = RuleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<FilterPattern> for String {
    fn from(pattern: FilterPattern) -> Self {
        pattern.source
    }
}

impl PartialEq for FilterPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// One side (include or exclude) of a rule's text filters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterSet {
    #[serde(default)]
    pub title: Vec<FilterPattern>,
    #[serde(default)]
    pub short_description: Vec<FilterPattern>,
    #[serde(default)]
    pub description: Vec<FilterPattern>,
    /// "0" (Monday) through "6", plus "weekend" and "weekday"
    #[serde(default)]
    pub day_of_week: Vec<String>,
}

impl FilterSet {
    fn contains_day(&self, day: u32) -> bool {
        let day = day.to_string();
        self.day_of_week.iter().any(|d| match d.as_str() {
            "weekend" => day == "5" || day == "6",
            "weekday" => matches!(day.as_str(), "0" | "1" | "2" | "3" | "4"),
            other => other == day,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TextFilters {
    #[serde(default)]
    pub include: FilterSet,
    #[serde(default)]
    pub exclude: FilterSet,
}

impl TextFilters {
    /// `day_of_week` is `None` when the day restriction must be ignored
    pub fn excludes(&self, title: &str, short: &str, extended: &str, day_of_week: Option<u32>) -> bool {
        self.is_excluded(title, short, extended, day_of_week)
            || self.is_not_included(title, short, extended, day_of_week)
    }

    fn is_excluded(&self, title: &str, short: &str, extended: &str, day_of_week: Option<u32>) -> bool {
        let exclude = &self.exclude;
        if let Some(day) = day_of_week {
            if !exclude.day_of_week.is_empty() && exclude.contains_day(day) {
                return true;
            }
        }
        exclude.title.iter().any(|p| p.is_match(title))
            || exclude.short_description.iter().any(|p| p.is_match(short))
            || exclude.description.iter().any(|p| p.is_match(extended))
    }

    fn is_not_included(&self, title: &str, short: &str, extended: &str, day_of_week: Option<u32>) -> bool {
        let include = &self.include;
        if let Some(day) = day_of_week {
            if !include.day_of_week.is_empty() && !include.contains_day(day) {
                return true;
            }
        }
        include.title.iter().any(|p| !p.is_match(title))
            || include.short_description.iter().any(|p| !p.is_match(short))
            || include.description.iter().any(|p| !p.is_match(extended))
    }
}

/// Period after which a rule's counter is refilled
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CounterPeriod {
    Week,
    Month,
    Year,
}

impl CounterPeriod {
    fn key(&self, local: &DateTime<Tz>) -> String {
        let format = match self {
            CounterPeriod::Week => "%U",
            CounterPeriod::Month => "%m",
            CounterPeriod::Year => "%Y",
        };
        local.format(format).to_string()
    }
}

/// Limit on how many new recordings a rule may create per period
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Counter {
    /// 0 means unlimited
    pub limit: u32,
    #[serde(default)]
    pub left: u32,
    #[serde(default)]
    pub period: Option<CounterPeriod>,
    /// Key of the period `left` belongs to
    #[serde(default)]
    pub active_period: String,
    #[serde(skip)]
    last_begin: Option<DateTime<Utc>>,
}

impl Counter {
    pub fn new(limit: u32, period: Option<CounterPeriod>) -> Self {
        Self {
            limit,
            left: limit,
            period,
            active_period: String::new(),
            last_begin: None,
        }
    }

    fn period_key(&self, local: &DateTime<Tz>) -> String {
        self.period.map(|p| p.key(local)).unwrap_or_default()
    }

    /// Refill the counter when a later event opens a new period
    pub fn update(&mut self, begin: DateTime<Utc>, local: &DateTime<Tz>) {
        if self.last_begin.is_some_and(|last| begin <= last) {
            return;
        }
        self.last_begin = Some(begin);
        if self.limit == 0 {
            return;
        }
        let key = self.period_key(local);
        if key != self.active_period {
            self.left = self.limit;
            self.active_period = key;
        }
    }

    pub fn is_exhausted(&self, local: &DateTime<Tz>) -> bool {
        if self.limit == 0 {
            return false;
        }
        if self.period_key(local) != self.active_period {
            return true;
        }
        self.left == 0
    }

    pub fn decrement(&mut self) {
        if self.limit > 0 && self.left > 0 {
            self.left -= 1;
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AfterEventRule {
    pub action: AfterEvent,
    /// Only applies when the recording ends inside this window
    #[serde(default)]
    pub timespan: Option<Timespan>,
}

fn default_true() -> bool {
    true
}

fn default_search_for_duplicate_description() -> u8 {
    2
}

/// A recording intent matched against the guide on every scan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    pub id: u32,
    pub name: String,
    #[serde(rename = "match")]
    pub match_text: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub search_type: SearchType,
    #[serde(default)]
    pub search_case: SearchCase,
    #[serde(default)]
    pub destination: Option<PathBuf>,
    #[serde(default)]
    pub offset: Option<Offset>,
    /// 0: off, 1: same service, 2: any service, 3: any service and recorded movies
    #[serde(default)]
    pub avoid_duplicate_description: u8,
    /// 0: title only, 1: plus short description, 2: plus extended description
    #[serde(default = "default_search_for_duplicate_description")]
    pub search_for_duplicate_description: u8,
    #[serde(default)]
    pub counter: Option<Counter>,
    #[serde(default)]
    pub timespan: Option<Timespan>,
    #[serde(default)]
    pub timeframe: Option<Timeframe>,
    #[serde(default)]
    pub services: ServiceFilter,
    #[serde(default)]
    pub duration: DurationBounds,
    #[serde(default)]
    pub filters: TextFilters,
    #[serde(default)]
    pub series_labeling: bool,
    #[serde(default)]
    pub after_event: Vec<AfterEventRule>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub override_alternatives: bool,
    /// Zap instead of record
    #[serde(default)]
    pub justplay: bool,
    /// Keep the end time for zap entries
    #[serde(default)]
    pub set_endtime: bool,
    #[serde(default)]
    pub vps_enabled: bool,
    #[serde(default)]
    pub vps_overwrite: bool,
}

impl Rule {
    pub fn new(id: u32, name: &str, match_text: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            match_text: match_text.to_string(),
            enabled: true,
            search_type: SearchType::default(),
            search_case: SearchCase::default(),
            destination: None,
            offset: None,
            avoid_duplicate_description: 0,
            search_for_duplicate_description: default_search_for_duplicate_description(),
            counter: None,
            timespan: None,
            timeframe: None,
            services: ServiceFilter::default(),
            duration: DurationBounds::default(),
            filters: TextFilters::default(),
            series_labeling: false,
            after_event: Vec::new(),
            tags: Vec::new(),
            override_alternatives: false,
            justplay: false,
            set_endtime: false,
            vps_enabled: false,
            vps_overwrite: false,
        }
    }

    pub fn validate(&self) -> RuleResult<()> {
        let spans = self
            .timespan
            .iter()
            .chain(self.after_event.iter().filter_map(|a| a.timespan.as_ref()));
        for span in spans {
            span.from.validate()?;
            span.to.validate()?;
        }
        Ok(())
    }

    pub fn search_query(&self) -> super::SearchQuery<'_> {
        super::SearchQuery {
            text: &self.match_text,
            search_type: self.search_type,
            case: self.search_case,
        }
    }

    /// Service allow/deny check; `members` expands a service group
    pub fn excludes_service(&self, service: &str, members: &dyn Fn(&str) -> Vec<String>) -> bool {
        if self.services.deny.iter().any(|s| s == service) {
            return true;
        }
        if self.services.allow.is_empty() {
            return false;
        }
        !self
            .services
            .allow
            .iter()
            .any(|allowed| allowed == service || members(allowed).iter().any(|m| m == service))
    }

    /// The allowed service group containing `service`, if any
    pub fn alternative_for(&self, service: &str, members: &dyn Fn(&str) -> Vec<String>) -> Option<String> {
        self.services
            .allow
            .iter()
            .find(|allowed| members(allowed).iter().any(|m| m == service))
            .cloned()
    }

    pub fn excludes_duration(&self, duration_secs: i64) -> bool {
        self.duration.excludes(duration_secs)
    }

    pub fn excludes_timespan(&self, local: &DateTime<Tz>) -> bool {
        self.timespan
            .is_some_and(|span| span.excludes(TimeOfDay::of(local)))
    }

    pub fn excludes_timeframe(&self, begin: DateTime<Utc>, tz: Tz) -> bool {
        self.timeframe.is_some_and(|frame| frame.excludes(begin, tz))
    }

    pub fn excludes_text(&self, title: &str, short: &str, extended: &str, day_of_week: Option<u32>) -> bool {
        self.filters.excludes(title, short, extended, day_of_week)
    }

    pub fn has_offset(&self) -> bool {
        self.offset.is_some()
    }

    /// Recording window with the rule's offset applied, `None` when it
    /// leaves the representable range
    pub fn apply_offset(
        &self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self.offset {
            Some(offset) => widen_window(
                begin,
                end,
                offset.before.checked_mul(60)?,
                offset.after.checked_mul(60)?,
            ),
            None => Some((begin, end)),
        }
    }

    pub fn update_counter(&mut self, begin: DateTime<Utc>, local: &DateTime<Tz>) {
        if let Some(counter) = self.counter.as_mut() {
            counter.update(begin, local);
        }
    }

    pub fn counter_exhausted(&self, local: &DateTime<Tz>) -> bool {
        self.counter.as_ref().is_some_and(|c| c.is_exhausted(local))
    }

    pub fn decrement_counter(&mut self) {
        if let Some(counter) = self.counter.as_mut() {
            counter.decrement();
        }
    }

    /// After-event action for a recording ending at `end`: the first entry
    /// whose window contains the end time, else the unconditional entry
    pub fn after_event_for(&self, end: &DateTime<Tz>) -> Option<AfterEvent> {
        let at = TimeOfDay::of(end);
        self.after_event
            .iter()
            .find(|a| a.timespan.is_some_and(|span| !span.excludes(at)))
            .or_else(|| self.after_event.iter().find(|a| a.timespan.is_none()))
            .map(|a| a.action)
    }

    /// Tag derived from the rule name: first letter upper-cased, spaces to underscores
    pub fn name_tag(&self) -> Option<String> {
        let name = self.name.trim();
        let mut chars = name.chars();
        let first = chars.next()?;
        Some(format!(
            "{}{}",
            first.to_uppercase(),
            chars.as_str().replace(' ', "_")
        ))
    }
}
