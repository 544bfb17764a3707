//! Dormancy detection
//!
//! Motion samples feed an owned [`DormancyMonitor`]; a periodic check raises
//! a [`DormancyEvent`] once the time since the last movement exceeds the
//! configured threshold. [`DormancyService`] runs the monitor as a background
//! task with a sample feed and an event broadcast.

pub mod monitor;
pub mod service;

pub use monitor::{DormancyEvent, DormancyMonitor};
pub use service::{DormancyService, FeedError, SampleFeed};

use std::time::Duration;

use crate::config::{RepeatPolicy, Settings};
use crate::motion::DEFAULT_MOVEMENT_THRESHOLD;

/// How often the elapsed time is compared against the threshold
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Default dormancy threshold (15 minutes)
pub const DEFAULT_DORMANCY_THRESHOLD: Duration = Duration::from_secs(15 * 60);

/// Evaluator configuration, fixed for one monitoring session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorConfig {
    /// Time without movement before an event is raised
    pub threshold: Duration,
    pub check_interval: Duration,
    /// Movement threshold for both gravity deviation and rotation
    pub movement_threshold: f64,
    pub repeat: RepeatPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_DORMANCY_THRESHOLD,
            check_interval: DEFAULT_CHECK_INTERVAL,
            movement_threshold: DEFAULT_MOVEMENT_THRESHOLD,
            repeat: RepeatPolicy::default(),
        }
    }
}

impl MonitorConfig {
    /// Derives the configuration from user settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            threshold: settings.dormancy_threshold(),
            repeat: settings.dormancy_repeat,
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn with_repeat(mut self, repeat: RepeatPolicy) -> Self {
        self.repeat = repeat;
        self
    }
}
