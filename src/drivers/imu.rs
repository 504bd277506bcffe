//! imu.rs
//! Register-level driver for the BNO055 absolute-orientation sensor.
//!
//! The driver does not track the device mode. Callers must put the device in
//! [`OperatingMode::Config`] before transferring calibration coefficients, and must let
//! the device settle after every mode change before trusting reads.

use std::{fmt, fs, io, path::Path, str::FromStr};

use log::{debug, info};

use crate::{error::ImuError, hal::I2cBus};

pub const DEVICE_ADDRESS: u8 = 0x28;

const REG_OPR_MODE: u8 = 0x3D;
const REG_CALIB_STAT: u8 = 0x35;
const REG_CALIB_COEFFS: u8 = 0x55;
const REG_EULER: u8 = 0x1A;
const REG_GYRO: u8 = 0x14;

pub const COEFFICIENT_LEN: usize = 22;

/// Orientation units per full revolution (1/16 degree).
pub const UNITS_PER_REVOLUTION: i32 = 5760;

/// Opaque calibration block, rewritten verbatim after every power cycle.
pub type CalibrationCoefficients = [u8; COEFFICIENT_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingMode {
    Config,
    AccOnly,
    MagOnly,
    GyroOnly,
    AccMag,
    AccGyro,
    MagGyro,
    Amg,
    Imu,
    Compass,
    M4g,
    NdofFmcOff,
    Ndof,
}

impl OperatingMode {
    /// Value written to the OPR_MODE register.
    pub const fn register_value(self) -> u8 {
        match self {
            OperatingMode::Config => 0b0000,
            OperatingMode::AccOnly => 0b0001,
            OperatingMode::MagOnly => 0b0010,
            OperatingMode::GyroOnly => 0b0011,
            OperatingMode::AccMag => 0b0100,
            OperatingMode::AccGyro => 0b0101,
            OperatingMode::MagGyro => 0b0110,
            OperatingMode::Amg => 0b0111,
            OperatingMode::Imu => 0b1000,
            OperatingMode::Compass => 0b1001,
            OperatingMode::M4g => 0b1010,
            OperatingMode::NdofFmcOff => 0b1011,
            OperatingMode::Ndof => 0b1100,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            OperatingMode::Config => "CONFIGMODE",
            OperatingMode::AccOnly => "ACCONLY",
            OperatingMode::MagOnly => "MAGONLY",
            OperatingMode::GyroOnly => "GYROONLY",
            OperatingMode::AccMag => "ACCMAG",
            OperatingMode::AccGyro => "ACCGYRO",
            OperatingMode::MagGyro => "MAGGYRO",
            OperatingMode::Amg => "AMG",
            OperatingMode::Imu => "IMU",
            OperatingMode::Compass => "COMPASS",
            OperatingMode::M4g => "M4G",
            OperatingMode::NdofFmcOff => "NDOF_FMC_OFF",
            OperatingMode::Ndof => "NDOF",
        }
    }

    pub const ALL: [OperatingMode; 13] = [
        OperatingMode::Config,
        OperatingMode::AccOnly,
        OperatingMode::MagOnly,
        OperatingMode::GyroOnly,
        OperatingMode::AccMag,
        OperatingMode::AccGyro,
        OperatingMode::MagGyro,
        OperatingMode::Amg,
        OperatingMode::Imu,
        OperatingMode::Compass,
        OperatingMode::M4g,
        OperatingMode::NdofFmcOff,
        OperatingMode::Ndof,
    ];
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperatingMode {
    type Err = ImuError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperatingMode::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ImuError::InvalidMode(s.to_string()))
    }
}

/// Three signed axes in device units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Triple {
    pub yaw: i16,
    pub roll: i16,
    pub pitch: i16,
}

impl Triple {
    fn from_le_bytes(raw: [u8; 6]) -> Self {
        Self {
            yaw: i16::from_le_bytes([raw[0], raw[1]]),
            roll: i16::from_le_bytes([raw[2], raw[3]]),
            pitch: i16::from_le_bytes([raw[4], raw[5]]),
        }
    }
}

pub struct Imu<B: I2cBus> {
    bus: B,
}

impl<B: I2cBus> Imu<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Single-byte write to OPR_MODE.
    pub fn change_mode(&mut self, mode: OperatingMode) -> Result<(), ImuError> {
        self.bus
            .mem_write(DEVICE_ADDRESS, REG_OPR_MODE, &[mode.register_value()])?;
        info!("[IMU] mode -> {}", mode);
        Ok(())
    }

    /// Mode change by name. An unknown name is rejected before touching the bus.
    pub fn change_mode_by_name(&mut self, name: &str) -> Result<(), ImuError> {
        let mode: OperatingMode = name.parse()?;
        self.change_mode(mode)
    }

    /// `true` when CALIB_STAT reports every subsystem fully calibrated.
    pub fn is_fully_calibrated(&mut self) -> Result<bool, ImuError> {
        let status = self.calibration_status()?;
        debug!("[IMU] calib status {:#010b}", status);
        Ok(status == 0xFF)
    }

    pub fn calibration_status(&mut self) -> Result<u8, ImuError> {
        let mut buf = [0u8; 1];
        self.bus.mem_read(DEVICE_ADDRESS, REG_CALIB_STAT, &mut buf)?;
        Ok(buf[0])
    }

    /// Only valid in config mode.
    pub fn read_coefficients(&mut self) -> Result<CalibrationCoefficients, ImuError> {
        let mut coeffs = [0u8; COEFFICIENT_LEN];
        self.bus.mem_read(DEVICE_ADDRESS, REG_CALIB_COEFFS, &mut coeffs)?;
        Ok(coeffs)
    }

    /// Only valid in config mode.
    pub fn write_coefficients(&mut self, coeffs: &[u8]) -> Result<(), ImuError> {
        if coeffs.len() != COEFFICIENT_LEN {
            return Err(ImuError::CoefficientLength {
                expected: COEFFICIENT_LEN,
                got: coeffs.len(),
            });
        }
        self.bus.mem_write(DEVICE_ADDRESS, REG_CALIB_COEFFS, coeffs)?;
        Ok(())
    }

    /// Euler angles (yaw, roll, pitch). Not valid in config mode.
    pub fn read_euler(&mut self) -> Result<Triple, ImuError> {
        self.read_triple(REG_EULER)
    }

    /// Angular velocity (yaw, roll, pitch rates). Not valid in config mode.
    pub fn read_angular_velocity(&mut self) -> Result<Triple, ImuError> {
        self.read_triple(REG_GYRO)
    }

    fn read_triple(&mut self, register: u8) -> Result<Triple, ImuError> {
        let mut raw = [0u8; 6];
        self.bus.mem_read(DEVICE_ADDRESS, register, &mut raw)?;
        Ok(Triple::from_le_bytes(raw))
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}

/// Read a persisted 22-byte coefficient block.
pub fn load_coefficients(path: impl AsRef<Path>) -> io::Result<CalibrationCoefficients> {
    let bytes = fs::read(path)?;
    bytes.as_slice().try_into().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected {} coefficient bytes, found {}", COEFFICIENT_LEN, bytes.len()),
        )
    })
}

/// Persist a coefficient block verbatim.
pub fn save_coefficients(path: impl AsRef<Path>, coeffs: &CalibrationCoefficients) -> io::Result<()> {
    fs::write(path, coeffs)
}
