//! Dormancy evaluator state
//!
//! Holds the time of the last detected movement for one monitoring
//! session. Pure and clock-agnostic: callers pass in samples and the
//! current instant.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use super::MonitorConfig;
use crate::clock::elapsed_between;
use crate::config::RepeatPolicy;
use crate::motion::{MotionSample, MotionSampler};

/// Raised when the user has not moved for longer than the threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DormancyEvent {
    pub last_movement_at: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
    pub time_since_movement_ms: u64,
}

impl DormancyEvent {
    pub fn time_since_movement(&self) -> Duration {
        Duration::from_millis(self.time_since_movement_ms)
    }

    /// Whole minutes since the last movement
    pub fn minutes(&self) -> u64 {
        self.time_since_movement_ms / 60_000
    }
}

/// Owned dormancy state for one monitoring session
#[derive(Debug)]
pub struct DormancyMonitor {
    config: MonitorConfig,
    sampler: MotionSampler,
    last_movement_at: DateTime<Utc>,
    /// Set once an event was raised for the current dormant stretch
    notified: bool,
}

impl DormancyMonitor {
    /// Starts a session; the start instant counts as the last movement
    pub fn new(config: MonitorConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            config,
            sampler: MotionSampler::new(config.movement_threshold),
            last_movement_at: started_at,
            notified: false,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn last_movement_at(&self) -> DateTime<Utc> {
        self.last_movement_at
    }

    /// Records a sample. Returns whether it counted as movement.
    ///
    /// `last_movement_at` never moves backwards, even for late samples.
    pub fn record_sample(&mut self, sample: &MotionSample) -> bool {
        if !self.sampler.is_movement(sample) {
            return false;
        }

        if sample.timestamp > self.last_movement_at {
            self.last_movement_at = sample.timestamp;
        }
        self.notified = false;

        tracing::debug!(
            "Movement detected: accel={:.3}, rotation={:.3}",
            sample.acceleration_magnitude,
            sample.rotation_magnitude
        );
        true
    }

    /// Compares elapsed time since the last movement against the threshold
    ///
    /// Exactly reaching the threshold does not count.
    pub fn check_dormancy(&mut self, now: DateTime<Utc>) -> Option<DormancyEvent> {
        let elapsed = elapsed_between(self.last_movement_at, now);
        if elapsed <= self.config.threshold {
            return None;
        }

        if self.config.repeat == RepeatPolicy::OncePerEpisode && self.notified {
            return None;
        }
        self.notified = true;

        Some(DormancyEvent {
            last_movement_at: self.last_movement_at,
            detected_at: now,
            time_since_movement_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::{Vector3, STANDARD_GRAVITY};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap()
    }

    fn minutes(n: i64) -> chrono::Duration {
        chrono::Duration::minutes(n)
    }

    fn still(at: DateTime<Utc>) -> MotionSample {
        MotionSample::from_acceleration(Vector3::new(0.0, 0.0, STANDARD_GRAVITY), at)
    }

    fn shake(at: DateTime<Utc>) -> MotionSample {
        MotionSample::from_acceleration(Vector3::new(0.0, 0.0, STANDARD_GRAVITY + 1.0), at)
    }

    #[test]
    fn test_still_samples_do_not_reset() {
        let mut monitor = DormancyMonitor::new(MonitorConfig::default(), t0());
        assert!(!monitor.record_sample(&still(t0() + minutes(5))));
        assert_eq!(monitor.last_movement_at(), t0());
    }

    #[test]
    fn test_movement_updates_last_movement() {
        let mut monitor = DormancyMonitor::new(MonitorConfig::default(), t0());
        assert!(monitor.record_sample(&shake(t0() + minutes(5))));
        assert_eq!(monitor.last_movement_at(), t0() + minutes(5));

        // Late sample must not move the clock backwards
        assert!(monitor.record_sample(&shake(t0() + minutes(2))));
        assert_eq!(monitor.last_movement_at(), t0() + minutes(5));
    }

    #[test]
    fn test_fires_after_threshold() {
        let mut monitor = DormancyMonitor::new(MonitorConfig::default(), t0());

        let event = monitor.check_dormancy(t0() + minutes(16)).unwrap();
        assert_eq!(event.time_since_movement_ms, 960_000);
        assert_eq!(event.minutes(), 16);
        assert_eq!(event.last_movement_at, t0());
    }

    #[test]
    fn test_exact_threshold_does_not_fire() {
        let mut monitor = DormancyMonitor::new(MonitorConfig::default(), t0());
        assert!(monitor.check_dormancy(t0() + minutes(15)).is_none());
        assert!(monitor
            .check_dormancy(t0() + minutes(15) + chrono::Duration::milliseconds(1))
            .is_some());
    }

    #[test]
    fn test_repeats_every_check_by_default() {
        let mut monitor = DormancyMonitor::new(MonitorConfig::default(), t0());
        assert!(monitor.check_dormancy(t0() + minutes(16)).is_some());
        assert!(monitor.check_dormancy(t0() + minutes(17)).is_some());
    }

    #[test]
    fn test_once_per_episode_until_movement() {
        let config = MonitorConfig::default().with_repeat(RepeatPolicy::OncePerEpisode);
        let mut monitor = DormancyMonitor::new(config, t0());

        assert!(monitor.check_dormancy(t0() + minutes(16)).is_some());
        assert!(monitor.check_dormancy(t0() + minutes(17)).is_none());

        monitor.record_sample(&shake(t0() + minutes(18)));
        assert!(monitor.check_dormancy(t0() + minutes(30)).is_none());
        assert!(monitor.check_dormancy(t0() + minutes(34)).is_some());
    }
}
