//! Motion sampling
//!
//! Reduces raw accelerometer and gyroscope vectors to a single liveness
//! decision: did this reading count as movement?
//!
//! Acceleration is gravity-inclusive, so a phone lying still reads roughly
//! 9.8 m/s². A reading is movement when its magnitude deviates from gravity
//! by more than the threshold, or when the rotation rate magnitude exceeds
//! the same threshold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gravity reference used for the acceleration deviation (m/s²)
pub const STANDARD_GRAVITY: f64 = 9.8;

/// Default movement threshold, shared by acceleration deviation and rotation
pub const DEFAULT_MOVEMENT_THRESHOLD: f64 = 0.15;

/// Sensor update interval requested from the platform
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// A three-axis sensor reading
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean length of the vector
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// A reduced motion reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionSample {
    /// Gravity-inclusive acceleration magnitude
    pub acceleration_magnitude: f64,
    /// Rotation rate magnitude
    pub rotation_magnitude: f64,
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,
}

impl MotionSample {
    /// Builds a sample from both sensor vectors
    pub fn new(acceleration: Vector3, rotation: Vector3, timestamp: DateTime<Utc>) -> Self {
        Self {
            acceleration_magnitude: acceleration.magnitude(),
            rotation_magnitude: rotation.magnitude(),
            timestamp,
        }
    }

    /// Builds a sample from an accelerometer reading alone
    ///
    /// The rotation component is zero, so only the gravity deviation counts.
    pub fn from_acceleration(acceleration: Vector3, timestamp: DateTime<Utc>) -> Self {
        Self {
            acceleration_magnitude: acceleration.magnitude(),
            rotation_magnitude: 0.0,
            timestamp,
        }
    }

    /// Builds a sample from a gyroscope reading alone
    ///
    /// The acceleration component sits exactly on gravity, so only the
    /// rotation counts.
    pub fn from_rotation(rotation: Vector3, timestamp: DateTime<Utc>) -> Self {
        Self {
            acceleration_magnitude: STANDARD_GRAVITY,
            rotation_magnitude: rotation.magnitude(),
            timestamp,
        }
    }

    /// Absolute deviation of the acceleration magnitude from gravity
    pub fn gravity_deviation(&self) -> f64 {
        (self.acceleration_magnitude - STANDARD_GRAVITY).abs()
    }
}

/// Fixed-threshold movement classifier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSampler {
    threshold: f64,
}

impl MotionSampler {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Returns true if the sample exceeds the threshold on either sensor
    ///
    /// NaN readings never count as movement.
    pub fn is_movement(&self, sample: &MotionSample) -> bool {
        sample.gravity_deviation() > self.threshold || sample.rotation_magnitude > self.threshold
    }
}

impl Default for MotionSampler {
    fn default() -> Self {
        Self::new(DEFAULT_MOVEMENT_THRESHOLD)
    }
}
