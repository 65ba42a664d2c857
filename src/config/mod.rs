use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::errors::{AppError, AppResult, ScanError};

pub mod defaults;
pub mod duration_serde;

use defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanSettings,
    #[serde(default)]
    pub margins: MarginConfig,
    #[serde(default)]
    pub main_context: MainContextConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which existing recordings a scan may modify
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPolicy {
    /// Never touch existing recordings
    None,
    /// Only recordings created by the scanner
    #[default]
    Auto,
    /// Any recording, with a warning for foreign ones
    All,
}

/// Global scan behaviour shared by every rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    #[serde(default)]
    pub refresh: RefreshPolicy,
    /// Bind events to existing recordings by time overlap when event ids differ
    #[serde(default = "default_try_guessing")]
    pub try_guessing: bool,
    #[serde(default)]
    pub add_similar_on_conflict: bool,
    #[serde(default)]
    pub disabled_on_conflict: bool,
    /// Remove own recordings whose event can no longer be resolved
    #[serde(default)]
    pub check_eit_and_remove: bool,
    #[serde(default)]
    pub add_autotimer_to_tags: bool,
    #[serde(default)]
    pub add_name_to_tags: bool,
    /// "The next N days"; 0 disables the horizon
    #[serde(default = "default_max_days_in_future")]
    pub max_days_in_future: u32,
    #[serde(default = "default_recording_path")]
    pub default_path: PathBuf,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginConfig {
    /// Minutes added before the event
    #[serde(default = "default_margin_before")]
    pub before: i64,
    /// Minutes added after the event
    #[serde(default = "default_margin_after")]
    pub after: i64,
    #[serde(default)]
    pub services: Vec<ServiceMargin>,
}

/// Per-service margin override
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceMargin {
    pub service: String,
    pub before: i64,
    pub after: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainContextConfig {
    /// How long a marshaled call may wait before shutdown is assumed
    #[serde(with = "duration_serde", default = "default_main_context_timeout")]
    pub timeout: Duration,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_scan_cron")]
    pub cron: String,
    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,
    #[serde(default)]
    pub simulate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_try_guessing() -> bool { DEFAULT_TRY_GUESSING }
fn default_max_days_in_future() -> u32 { DEFAULT_MAX_DAYS_IN_FUTURE }
fn default_recording_path() -> PathBuf { PathBuf::from(DEFAULT_RECORDING_PATH) }
fn default_timezone() -> String { DEFAULT_TIMEZONE.to_string() }
fn default_margin_before() -> i64 { DEFAULT_MARGIN_BEFORE }
fn default_margin_after() -> i64 { DEFAULT_MARGIN_AFTER }
fn default_main_context_timeout() -> Duration {
    humantime::parse_duration(DEFAULT_MAIN_CONTEXT_TIMEOUT).unwrap_or(Duration::from_secs(1800))
}
fn default_queue_depth() -> usize { DEFAULT_MAIN_CONTEXT_QUEUE_DEPTH }
fn default_scan_cron() -> String { DEFAULT_SCAN_CRON.to_string() }
fn default_run_on_start() -> bool { DEFAULT_RUN_ON_START }
fn default_log_level() -> String { DEFAULT_LOG_LEVEL.to_string() }

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            refresh: RefreshPolicy::default(),
            try_guessing: default_try_guessing(),
            add_similar_on_conflict: false,
            disabled_on_conflict: false,
            check_eit_and_remove: false,
            add_autotimer_to_tags: false,
            add_name_to_tags: false,
            max_days_in_future: default_max_days_in_future(),
            default_path: default_recording_path(),
            timezone: default_timezone(),
        }
    }
}

impl ScanSettings {
    /// Resolve the configured timezone name
    pub fn tz(&self) -> Result<Tz, ScanError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ScanError::InvalidTimezone {
                name: self.timezone.clone(),
            })
    }
}

impl Default for MarginConfig {
    fn default() -> Self {
        Self {
            before: default_margin_before(),
            after: default_margin_after(),
            services: Vec::new(),
        }
    }
}

impl MarginConfig {
    /// Margins in seconds for a service, falling back to the global default
    pub fn for_service(&self, service: &str) -> (i64, i64) {
        self.services
            .iter()
            .find(|m| m.service == service)
            .map(|m| (m.before.saturating_mul(60), m.after.saturating_mul(60)))
            .unwrap_or_else(|| self.global())
    }

    /// Global margins in seconds
    pub fn global(&self) -> (i64, i64) {
        (self.before.saturating_mul(60), self.after.saturating_mul(60))
    }
}

impl Default for MainContextConfig {
    fn default() -> Self {
        Self {
            timeout: default_main_context_timeout(),
            queue_depth: default_queue_depth(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: default_scan_cron(),
            run_on_start: default_run_on_start(),
            simulate: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file layered with `AUTOTIMER__*`
    /// environment variables. A missing file is created with the defaults.
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            let contents = toml::to_string_pretty(&Self::default())?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)?;
            info!("Wrote default configuration to {}", path.display());
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix("AUTOTIMER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| AppError::config(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| AppError::config(e.to_string()))?;
        config.scan.tz()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.scan.refresh, RefreshPolicy::Auto);
        assert!(config.scan.try_guessing);
        assert_eq!(config.main_context.timeout, Duration::from_secs(1800));
        assert_eq!(config.scan.tz().unwrap(), chrono_tz::UTC);
    }

    #[test]
    fn test_service_margin_override() {
        let margins = MarginConfig {
            before: 2,
            after: 10,
            services: vec![ServiceMargin {
                service: "1:0:19:283D:3FB:1:C00000:0:0:0:".to_string(),
                before: 5,
                after: 15,
            }],
        };
        assert_eq!(margins.for_service("1:0:19:283D:3FB:1:C00000:0:0:0:"), (300, 900));
        assert_eq!(margins.for_service("1:0:1:6DCA:44D:1:C00000:0:0:0:"), (120, 600));
    }

    #[test]
    fn test_load_writes_defaults_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autotimer.toml");
        let config = Config::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.scan.max_days_in_future, 0);

        std::fs::write(
            &path,
            r#"
[scan]
refresh = "all"
add_similar_on_conflict = true
timezone = "Europe/Berlin"

[margins]
before = 3
after = 7

[[margins.services]]
service = "1:0:19:283D:3FB:1:C00000:0:0:0:"
before = 1
after = 2

[main_context]
timeout = "90s"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.scan.refresh, RefreshPolicy::All);
        assert!(config.scan.add_similar_on_conflict);
        assert_eq!(config.scan.tz().unwrap(), chrono_tz::Europe::Berlin);
        assert_eq!(config.margins.global(), (180, 420));
        assert_eq!(config.margins.services.len(), 1);
        assert_eq!(config.main_context.timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_invalid_timezone_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autotimer.toml");
        std::fs::write(&path, "[scan]\ntimezone = \"Mars/Olympus\"\n").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
