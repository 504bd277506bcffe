//! error.rs
//! Error types shared across drivers, control tasks and the binaries.

use std::io;

use thiserror::Error;

/// Transfer failure on a register bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("device 0x{device:02X} did not acknowledge")]
    Nack { device: u8 },
    #[error("bus timeout")]
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImuError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
    #[error("invalid mode name: {0}")]
    InvalidMode(String),
    #[error("calibration coefficients must be {expected} bytes, got {got}")]
    CoefficientLength { expected: usize, got: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("expected {expected} levels, got {got}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("channel {channel}: black level equals white level ({level})")]
    DegenerateLevels { channel: usize, level: i32 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] io::Error),
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Imu(#[from] ImuError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StartupError {
    #[error("battery too low: {volts:.2} V (minimum {minimum:.2} V)")]
    LowBattery { volts: f64, minimum: f64 },
}

/// Failure of one scheduled step.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    #[error("imu: {0}")]
    Imu(#[from] ImuError),
    #[error("bus: {0}")]
    Bus(#[from] BusError),
}

/// Anything that keeps the robot from reaching its first scheduled pass.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("array calibration: {0}")]
    Calibration(#[from] CalibrationError),
    #[error("imu setup: {0}")]
    Imu(#[from] ImuError),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}
