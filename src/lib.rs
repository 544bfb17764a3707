//! Angaza - Personal safety core
//!
//! Dormancy detection and emergency alert orchestration, embedded by the
//! Android and iOS shells.

pub mod alert;
pub mod app;
pub mod clock;
pub mod config;
pub mod dormancy;
pub mod location;
pub mod motion;
pub mod platform;
pub mod store;
pub mod transcription;

pub use alert::{
    AlertError, AlertOrchestrator, AlertOutcome, AlertServices, AlertState, TriggerSource,
};
pub use app::{AppEvent, DormancyPrompt, DormancyResponse, SafetyApp, SOS_DEEP_LINK};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RepeatPolicy, SettingChange, Settings, SettingsStore};
pub use dormancy::{
    DormancyEvent, DormancyMonitor, DormancyService, FeedError, MonitorConfig, SampleFeed,
};
pub use motion::{MotionSample, MotionSampler, Vector3};

use std::path::{Path, PathBuf};

/// Log file name inside the log directory
const LOG_FILE_NAME: &str = "angaza.log";

/// Default log directory (~/.angaza/logs)
pub fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".angaza").join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join("angaza-logs"))
}

/// Installs the global tracing subscriber
///
/// Logs go to stdout and to `angaza.log` in `log_dir` (default
/// [`default_log_dir`]), stamped with local time. The filter defaults to
/// `info` and can be overridden with `RUST_LOG`. Calling this again is a
/// no-op.
pub fn init_logging(log_dir: Option<&Path>) {
    use tracing_subscriber::prelude::*;

    /// Format timestamps using the system's local time via chrono
    struct LocalTimer;
    impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
        fn format_time(
            &self,
            w: &mut tracing_subscriber::fmt::format::Writer<'_>,
        ) -> std::fmt::Result {
            write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
        }
    }

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    let log_dir = log_dir.map(Path::to_path_buf).unwrap_or_else(default_log_dir);
    let _ = std::fs::create_dir_all(&log_dir);
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE_NAME))
        .ok();

    let result = if let Some(file) = log_file {
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_timer(LocalTimer)
            .with_ansi(false);
        let stdout_layer = tracing_subscriber::fmt::layer().with_timer(LocalTimer);
        tracing_subscriber::registry()
            .with(filter())
            .with(stdout_layer)
            .with(file_layer)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter())
            .with(tracing_subscriber::fmt::layer().with_timer(LocalTimer))
            .try_init()
    };

    if result.is_ok() {
        tracing::info!("Angaza logging initialised at {:?}", log_dir);
    }
}
