//! config.rs
//! Tuned constants for the robot and the course, loadable from JSON.
//!
//! Every field has a default equal to the values tuned on the real track, so a config
//! file only needs to name what it overrides.

use std::{fs, path::{Path, PathBuf}};

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    control::{pid::PidGains, tracker::CourseConfig},
    drivers::{
        battery::BatteryConfig,
        imu::{OperatingMode, UNITS_PER_REVOLUTION},
        sensor_array::ThicknessThresholds,
    },
    error::{CalibrationError, ConfigError},
};

/// Line-following phase of the Controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    /// Centroid setpoint, in 1-based channel units.
    pub center_index: f64,
    /// Feed-forward wheel velocity [rad/s].
    pub feed_forward: f64,
    /// Wheel velocity saturation [rad/s].
    pub max_velocity: f64,
    pub gains: PidGains,
    /// Turn bias applied while the line is ignored [rad/s].
    pub ignore_bias: f64,
    pub thresholds: ThicknessThresholds,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            center_index: 6.0,
            feed_forward: 7.0,
            max_velocity: 19.0,
            gains: PidGains::new(1.25, 0.1, 0.0),
            ignore_bias: 1.0,
            thresholds: ThicknessThresholds::default(),
        }
    }
}

/// Heading-hold phase of the Controller. Angles are IMU units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingConfig {
    pub gains: PidGains,
    /// Forward component of both wheels [rad/s].
    pub base_velocity: f64,
    pub max_velocity: f64,
    /// Error band in which the heading PID is reset once.
    pub deadband: i32,
    pub period: i32,
    pub quarter_turn: i32,
}

impl Default for HeadingConfig {
    fn default() -> Self {
        Self {
            gains: PidGains::new(0.03, 0.0075, 0.0),
            base_velocity: 6.0,
            max_velocity: 7.5,
            deadband: 75,
            period: UNITS_PER_REVOLUTION,
            quarter_turn: UNITS_PER_REVOLUTION / 4,
        }
    }
}

impl HeadingConfig {
    pub fn half_turn(&self) -> i32 {
        self.period / 2
    }
}

/// Per-wheel velocity loop and its feed-forward model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    pub gains: PidGains,
    /// Motor gain [(rad/s)/V].
    pub motor_gain: f64,
    /// Voltage to overcome static friction [V].
    pub friction_offset: f64,
    pub ticks_per_revolution: f64,
    /// Effort saturation [%].
    pub max_effort: f64,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            gains: PidGains::new(0.5, 0.25, 0.0),
            motor_gain: 5.57,
            friction_offset: 2.1,
            ticks_per_revolution: 1_440.0,
            max_effort: 100.0,
        }
    }
}

/// White/black reference levels for the reflectance array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub white: Vec<i32>,
    pub black: Vec<i32>,
    /// Indices of unpopulated channels.
    pub absent: Vec<usize>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            white: vec![2548, 821, 604, 520, 288, 303, 0, 328, 386, 310, 1027, 494, 1934],
            black: vec![3479, 2297, 2470, 2542, 1974, 1871, 0, 1933, 2607, 1908, 3040, 2648, 3454],
            absent: vec![6],
        }
    }
}

impl CalibrationConfig {
    pub fn channel_count(&self) -> usize {
        self.white.len()
    }

    pub fn is_populated(&self, channel: usize) -> bool {
        !self.absent.contains(&channel)
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.black.len() != self.white.len() {
            return Err(CalibrationError::LengthMismatch {
                expected: self.white.len(),
                got: self.black.len(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuConfig {
    /// Operating mode name used while driving.
    pub mode: String,
    /// Persisted 22-byte coefficient block, written into the device at startup.
    pub coefficients_path: Option<PathBuf>,
    /// Settling time after a mode change.
    pub settle_ms: u64,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            mode: OperatingMode::Imu.name().to_string(),
            coefficients_path: None,
            settle_ms: 20,
        }
    }
}

impl ImuConfig {
    pub fn operating_mode(&self) -> Result<OperatingMode, ConfigError> {
        Ok(self.mode.parse()?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskTiming {
    pub period_ms: u64,
    /// Higher runs first.
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub controller: TaskTiming,
    pub tracker: TaskTiming,
    pub wheels: TaskTiming,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            controller: TaskTiming { period_ms: 10, priority: 2 },
            tracker: TaskTiming { period_ms: 20, priority: 1 },
            wheels: TaskTiming { period_ms: 5, priority: 3 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub line: LineConfig,
    pub heading: HeadingConfig,
    pub wheel: WheelConfig,
    pub course: CourseConfig,
    pub calibration: CalibrationConfig,
    pub imu: ImuConfig,
    pub scheduler: SchedulerConfig,
    pub battery: BatteryConfig,
}

impl RobotConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        info!("[Config] loaded {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: RobotConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.calibration.validate()?;
        self.imu.operating_mode()?;
        Ok(())
    }
}
