//! Scan orchestration
//!
//! A scan walks every enabled rule, searches the guide with it, and runs
//! each candidate through the filter pipeline and the conflict resolver.
//! The existing-recording index and the movie index are built once per scan
//! and shared by all rules, so recordings added for one rule are visible to
//! the duplicate checks of the next.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::ScanError;
use crate::guide::{GuideSource, MediaLibrary, SeriesEnricher};
use crate::index::{MovieIndex, TimerIndex};
use crate::models::{Rule, RuleRegistry, RuleReport, ScanOutcome, ScanResult};
use crate::pipeline::{ConflictResolver, EventFilterPipeline, FilterContext, RulePass, Verdict};
use crate::recorder::RecorderHandle;
use crate::utils::time::event_horizon;

pub mod scheduler;

pub use scheduler::{create_rescan_channel, ScanScheduler};

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Evaluate everything but leave the recording subsystem untouched
    pub simulate: bool,
    /// Only scan the rule with this id
    pub rule_id: Option<u32>,
    /// Clock override, defaults to the current time
    pub now: Option<DateTime<Utc>>,
}

pub struct ScanOrchestrator {
    config: Config,
    guide: Arc<dyn GuideSource>,
    library: Arc<dyn MediaLibrary>,
    enricher: Option<Arc<dyn SeriesEnricher>>,
    recorder: Option<RecorderHandle>,
}

impl ScanOrchestrator {
    pub fn new(config: Config, guide: Arc<dyn GuideSource>, library: Arc<dyn MediaLibrary>) -> Self {
        Self {
            config,
            guide,
            library,
            enricher: None,
            recorder: None,
        }
    }

    pub fn with_recorder(mut self, recorder: RecorderHandle) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn SeriesEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Scan all enabled rules and collect every classification
    pub async fn scan(&self, rules: &mut RuleRegistry, options: &ScanOptions) -> Result<ScanResult, ScanError> {
        self.run(rules, options, None).await
    }

    /// Scan all enabled rules, handing each rule's classifications to
    /// `on_rule` as soon as the rule is done. The returned result carries
    /// the counts only, `total` included.
    pub async fn scan_streaming<F>(
        &self,
        rules: &mut RuleRegistry,
        options: &ScanOptions,
        mut on_rule: F,
    ) -> Result<ScanResult, ScanError>
    where
        F: FnMut(RuleReport) + Send,
    {
        self.run(rules, options, Some(&mut on_rule)).await
    }

    async fn run(
        &self,
        rules: &mut RuleRegistry,
        options: &ScanOptions,
        mut on_rule: Option<&mut (dyn FnMut(RuleReport) + Send)>,
    ) -> Result<ScanResult, ScanError> {
        let recorder = self.recorder.as_ref().ok_or(ScanError::RecorderUnavailable)?;
        if recorder.is_closed() {
            return Err(ScanError::MainContextClosed);
        }

        let settings = &self.config.scan;
        let tz = settings.tz()?;
        let now = options.now.unwrap_or_else(Utc::now);

        info!(
            "Starting {} scan of {} rules",
            if options.simulate { "simulated" } else { "live" },
            rules.enabled().count()
        );

        let horizon = event_horizon(now, tz, settings.max_days_in_future);
        if horizon.is_none() && settings.max_days_in_future > 0 {
            warn!(
                "max_days_in_future = {} reaches past the calendar, scanning without a horizon",
                settings.max_days_in_future
            );
        }

        let mut timers = TimerIndex::populate(recorder, self.guide.as_ref(), settings).await;
        let mut movies = MovieIndex::new();

        let pipeline = EventFilterPipeline::new(FilterContext {
            settings,
            margins: &self.config.margins,
            tz,
            now,
            horizon,
            guide: self.guide.as_ref(),
            library: self.library.as_ref(),
            enricher: self.enricher.as_deref(),
        });
        let resolver = ConflictResolver::new(settings, tz, recorder, options.simulate);

        let mut result = ScanResult::new(options.simulate);

        for rule in rules.rules_mut().filter(|r| r.enabled) {
            if options.rule_id.is_some_and(|id| id != rule.id) {
                continue;
            }

            let outcome = Self::scan_rule(self.guide.as_ref(), rule, &pipeline, &resolver, &mut timers, &mut movies).await;
            info!(
                "Rule '{}': {} new, {} modified, {} timers, {} conflicting, {} similar, {} skipped",
                rule.name,
                outcome.new,
                outcome.modified,
                outcome.timers.len(),
                outcome.conflicting.len(),
                outcome.similars.len(),
                outcome.skipped.len()
            );

            match on_rule.as_deref_mut() {
                Some(callback) => {
                    result.absorb(outcome.clone(), false);
                    callback(RuleReport {
                        rule_id: rule.id,
                        rule_name: rule.name.clone(),
                        outcome,
                    });
                }
                None => result.absorb(outcome, true),
            }
        }

        info!(
            "Scan {} finished: {} timers, {} new, {} modified",
            result.scan_id, result.total, result.new, result.modified
        );
        Ok(result)
    }

    async fn scan_rule(
        guide: &dyn GuideSource,
        rule: &mut Rule,
        pipeline: &EventFilterPipeline<'_>,
        resolver: &ConflictResolver<'_>,
        timers: &mut TimerIndex,
        movies: &mut MovieIndex,
    ) -> ScanOutcome {
        let candidates = guide.search(&rule.search_query());
        debug!("Rule '{}' matched {} events", rule.name, candidates.len());

        let mut pass = RulePass::new(candidates);
        while let Some(position) = pass.next_position() {
            let event = pass.event(position).clone();
            let similar = pass.groups.contains(event.event_id);
            match pipeline.evaluate(rule, &event, similar, timers, movies) {
                Verdict::Skip(skipped) => pass.outcome.skipped.push(skipped),
                Verdict::Accept(decision) => {
                    resolver
                        .commit(rule, decision, position, &mut pass, timers)
                        .await
                }
            }
        }
        pass.into_outcome()
    }
}
