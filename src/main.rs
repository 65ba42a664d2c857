use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Use the library instead of redeclaring modules
use autotimer::{
    config::{Config, ScheduleConfig},
    models::RuleRegistry,
    recorder::{MainContext, Recorder},
    scan::{ScanOptions, ScanOrchestrator, ScanScheduler},
    sources::Snapshot,
};

#[derive(Parser)]
#[command(name = "autotimer")]
#[command(version = "0.1.0")]
#[command(about = "Scans the program guide and schedules recordings from autotimer rules")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Snapshot file with rules, guide, recordings and media directories
    #[arg(short, long, value_name = "FILE")]
    snapshot: PathBuf,

    /// Create and modify recordings instead of simulating
    #[arg(long)]
    apply: bool,

    /// Only scan the rule with this id
    #[arg(short, long, value_name = "ID")]
    rule: Option<u32>,

    /// Print one report per rule as soon as it is scanned
    #[arg(long)]
    stream: bool,

    /// Keep running and scan on the configured cron schedule
    #[arg(long)]
    daemon: bool,

    /// Log level (overrides config file)
    #[arg(short = 'v', long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(Path::new(&cli.config))?;

    let log_level = cli.log_level.clone().unwrap_or_else(|| config.logging.level.clone());
    let log_filter = format!("autotimer={}", log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting autotimer v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", cli.config);

    let snapshot = Snapshot::load(&cli.snapshot)?;
    let mut rules = RuleRegistry::from_rules(snapshot.rules.clone())?;
    info!("Loaded {} rules from {}", rules.len(), cli.snapshot.display());

    let context = MainContext::spawn(Box::new(snapshot.recorder()), &config.main_context);
    let schedule = config.schedule.clone();
    let orchestrator = ScanOrchestrator::new(
        config,
        Arc::new(snapshot.guide()),
        Arc::new(snapshot.library()),
    )
    .with_recorder(context.handle());

    if cli.daemon {
        run_daemon(orchestrator, rules, &schedule).await?;
    } else {
        let options = ScanOptions {
            simulate: !cli.apply,
            rule_id: cli.rule,
            now: None,
        };

        let result = if cli.stream {
            orchestrator
                .scan_streaming(&mut rules, &options, |report| {
                    match serde_json::to_string(&report) {
                        Ok(line) => println!("{}", line),
                        Err(e) => error!("Failed to encode report for rule '{}': {}", report.rule_name, e),
                    }
                })
                .await?
        } else {
            orchestrator.scan(&mut rules, &options).await?
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
        drop(orchestrator);
    }

    if let Some(recorder) = context.shutdown().await {
        info!("Recorder holds {} entries", recorder.records().len());
    }
    Ok(())
}

async fn run_daemon(orchestrator: ScanOrchestrator, rules: RuleRegistry, schedule: &ScheduleConfig) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = ScanScheduler::new(
        Arc::new(orchestrator),
        Arc::new(Mutex::new(rules)),
        schedule,
        None,
        shutdown_rx,
    )?;

    let mut results = scheduler.subscribe();
    tokio::spawn(async move {
        loop {
            match results.recv().await {
                Ok(result) => match serde_json::to_string(&result) {
                    Ok(line) => println!("{}", line),
                    Err(e) => error!("Failed to encode scan result: {}", e),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    error!("Dropped {} scan results", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    scheduler.start().await
}
