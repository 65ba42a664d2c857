use anyhow::Result;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, trace};

use super::{ScanOptions, ScanOrchestrator};
use crate::config::ScheduleConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{RuleRegistry, ScanResult};

pub type RescanSender = broadcast::Sender<()>;
pub type RescanReceiver = broadcast::Receiver<()>;

pub fn create_rescan_channel() -> (RescanSender, RescanReceiver) {
    broadcast::channel(16)
}

/// Runs scans on a cron schedule and on demand
pub struct ScanScheduler {
    orchestrator: Arc<ScanOrchestrator>,
    rules: Arc<Mutex<RuleRegistry>>,
    schedule: Schedule,
    cron: String,
    run_on_start: bool,
    simulate: bool,
    rescan_rx: Option<RescanReceiver>,
    shutdown_rx: watch::Receiver<bool>,
    results_tx: broadcast::Sender<ScanResult>,
}

impl ScanScheduler {
    pub fn new(
        orchestrator: Arc<ScanOrchestrator>,
        rules: Arc<Mutex<RuleRegistry>>,
        config: &ScheduleConfig,
        rescan_rx: Option<RescanReceiver>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> AppResult<Self> {
        let schedule = Schedule::from_str(&config.cron)
            .map_err(|e| AppError::config(format!("invalid cron expression '{}': {}", config.cron, e)))?;
        let (results_tx, _) = broadcast::channel(16);

        Ok(Self {
            orchestrator,
            rules,
            schedule,
            cron: config.cron.clone(),
            run_on_start: config.run_on_start,
            simulate: config.simulate,
            rescan_rx,
            shutdown_rx,
            results_tx,
        })
    }

    /// Results of every scan run from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ScanResult> {
        self.results_tx.subscribe()
    }

    pub async fn start(mut self) -> Result<()> {
        info!("Starting scan scheduler (cron: {})", self.cron);

        let mut next_run = self.schedule.upcoming(Utc).next();
        Self::log_next_run(next_run);

        if self.run_on_start {
            self.run_scan("startup").await;
        }

        let mut interval = interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    trace!("Scheduler tick");
                    let now = Utc::now();
                    if next_run.is_some_and(|at| now >= at) {
                        self.run_scan("schedule").await;
                        next_run = self.schedule.after(&now).next();
                        Self::log_next_run(next_run);
                    }
                }
                requested = Self::receive_rescan(&mut self.rescan_rx), if self.rescan_rx.is_some() => {
                    if requested {
                        debug!("Received rescan request");
                        self.run_scan("rescan request").await;
                    } else {
                        debug!("Rescan channel closed");
                        self.rescan_rx = None;
                    }
                }
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("Scan scheduler stopped");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// `false` once every sender is gone
    async fn receive_rescan(rescan_rx: &mut Option<RescanReceiver>) -> bool {
        match rescan_rx {
            Some(rx) => !matches!(rx.recv().await, Err(broadcast::error::RecvError::Closed)),
            None => std::future::pending::<bool>().await,
        }
    }

    fn log_next_run(next_run: Option<DateTime<Utc>>) {
        match next_run {
            Some(at) => info!("Next scheduled scan: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            None => info!("Cron schedule has no upcoming runs"),
        }
    }

    async fn run_scan(&self, trigger: &str) {
        debug!("Running scan ({})", trigger);
        let options = ScanOptions {
            simulate: self.simulate,
            ..Default::default()
        };

        let mut rules = self.rules.lock().await;
        match self.orchestrator.scan(&mut rules, &options).await {
            Ok(result) => {
                info!(
                    "Scan triggered by {} produced {} timers ({} new, {} modified)",
                    trigger, result.total, result.new, result.modified
                );
                // No subscribers is fine
                let _ = self.results_tx.send(result);
            }
            Err(e) => error!("Scan triggered by {} failed: {}", trigger, e),
        }
    }
}
