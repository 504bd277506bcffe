//! light_sensor.rs
//! One IR reflectance channel with white/black calibration.

use serde::{Deserialize, Serialize};

use crate::hal::AdcChannel;

/// Used until a white level is configured.
pub const DEFAULT_WHITE_LEVEL: i32 = 0;
/// Used until a black level is configured (5 V full scale of a 12-bit ADC).
pub const DEFAULT_BLACK_LEVEL: i32 = 5 * 4_096;

/// Reference readings for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CalibrationLevels {
    pub white: Option<i32>,
    pub black: Option<i32>,
}

impl CalibrationLevels {
    pub fn effective(&self) -> (i32, i32) {
        (
            self.white.unwrap_or(DEFAULT_WHITE_LEVEL),
            self.black.unwrap_or(DEFAULT_BLACK_LEVEL),
        )
    }
}

pub struct LightSensor<A: AdcChannel> {
    adc: A,
    levels: CalibrationLevels,
}

impl<A: AdcChannel> LightSensor<A> {
    pub fn new(adc: A) -> Self {
        Self {
            adc,
            levels: CalibrationLevels::default(),
        }
    }

    #[inline]
    pub fn read_raw(&mut self) -> i32 {
        self.adc.read_raw()
    }

    /// Reading scaled so white is 0 and black is 1.
    pub fn read(&mut self) -> f64 {
        let (white, black) = self.levels.effective();
        let span = black - white;
        if span == 0 {
            return 0.0;
        }
        f64::from(self.read_raw() - white) / f64::from(span)
    }

    /// Set the white level, or sample the current raw value when `None`.
    pub fn set_white_level(&mut self, level: Option<i32>) -> i32 {
        let level = level.unwrap_or_else(|| self.read_raw());
        self.levels.white = Some(level);
        level
    }

    /// Set the black level, or sample the current raw value when `None`.
    pub fn set_black_level(&mut self, level: Option<i32>) -> i32 {
        let level = level.unwrap_or_else(|| self.read_raw());
        self.levels.black = Some(level);
        level
    }

    pub fn levels(&self) -> CalibrationLevels {
        self.levels
    }

    pub fn adc_mut(&mut self) -> &mut A {
        &mut self.adc
    }
}
