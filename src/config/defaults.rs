/// Configuration default values
///
/// All defaults for configuration options live here so they can be changed
/// in one place.
// Scan defaults
pub const DEFAULT_TRY_GUESSING: bool = true;
pub const DEFAULT_MAX_DAYS_IN_FUTURE: u32 = 0;
pub const DEFAULT_RECORDING_PATH: &str = "/media/hdd/movie/";
pub const DEFAULT_TIMEZONE: &str = "UTC";

// Recording margins (minutes)
pub const DEFAULT_MARGIN_BEFORE: i64 = 0;
pub const DEFAULT_MARGIN_AFTER: i64 = 0;

// Main context defaults
pub const DEFAULT_MAIN_CONTEXT_TIMEOUT: &str = "30m";
pub const DEFAULT_MAIN_CONTEXT_QUEUE_DEPTH: usize = 32;

// Scheduling defaults
pub const DEFAULT_SCAN_CRON: &str = "0 0 */4 * * *";
pub const DEFAULT_RUN_ON_START: bool = true;

// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";
